//! Backlog search job

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use super::SingleFlight;
use crate::services::backlog::{BacklogReport, BacklogSweep};

pub struct BacklogSearchJob {
    sweep: BacklogSweep,
    cancel: CancellationToken,
    flight: SingleFlight,
}

impl BacklogSearchJob {
    pub fn new(sweep: BacklogSweep, cancel: CancellationToken) -> Self {
        Self {
            sweep,
            cancel,
            flight: SingleFlight::default(),
        }
    }

    pub async fn run(&self) -> Option<BacklogReport> {
        let Some(_guard) = self.flight.try_begin() else {
            info!(job = "backlog_search", "Previous backlog search still running, skipping");
            return None;
        };

        let span = info_span!("job", job = "backlog_search", run_id = %Uuid::new_v4());
        async {
            info!("Running backlog search");
            match self.sweep.run(&self.cancel).await {
                Ok(report) => Some(report),
                Err(e) => {
                    error!(error = %e, "Backlog search failed");
                    None
                }
            }
        }
        .instrument(span)
        .await
    }
}
