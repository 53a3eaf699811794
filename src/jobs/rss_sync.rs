//! RSS sync job

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use super::SingleFlight;
use crate::indexer::IndexerDefinition;
use crate::services::ingest::{FeedIngestionPipeline, IngestReport};

pub struct RssSyncJob {
    pipeline: FeedIngestionPipeline,
    indexers: Arc<Vec<IndexerDefinition>>,
    cancel: CancellationToken,
    flight: SingleFlight,
}

impl RssSyncJob {
    pub fn new(
        pipeline: FeedIngestionPipeline,
        indexers: Arc<Vec<IndexerDefinition>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            pipeline,
            indexers,
            cancel,
            flight: SingleFlight::default(),
        }
    }

    /// Run one sync unless one is already in progress
    pub async fn run(&self) -> Option<IngestReport> {
        let Some(_guard) = self.flight.try_begin() else {
            info!(job = "rss_sync", "Previous RSS sync still running, skipping");
            return None;
        };

        let span = info_span!("job", job = "rss_sync", run_id = %Uuid::new_v4());
        let report = async {
            info!("Running RSS sync");
            let report = self.pipeline.run(&self.indexers, &self.cancel).await;
            for failure in &report.failures {
                warn!(error = %failure, "RSS sync failure");
            }
            report
        }
        .instrument(span)
        .await;

        Some(report)
    }
}
