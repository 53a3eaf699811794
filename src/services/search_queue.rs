//! Search queue
//!
//! Default [`SearchDispatcher`]: commands are queued on a bounded channel and
//! executed by a background task with limited concurrency. The stock worker
//! asks every searchable indexer for the command and feeds the results through
//! the ingestion pipeline, so searched releases pass the same gates as feed
//! releases.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::SeriesRepository;
use crate::indexer::{IndexerDefinition, ReleaseSearcher, SearchQuery};
use crate::services::backlog::{SearchCommand, SearchDispatcher};
use crate::services::ingest::FeedIngestionPipeline;

#[derive(Debug, Clone)]
pub struct SearchQueueConfig {
    pub max_concurrent: usize,
    /// Pending commands before `dispatch` waits
    pub queue_capacity: usize,
    /// Pause between starting searches; indexers dislike bursts
    pub job_delay: Duration,
}

impl Default for SearchQueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            queue_capacity: 1000,
            job_delay: Duration::from_millis(500),
        }
    }
}

struct SearchJob {
    id: Uuid,
    command: SearchCommand,
}

/// Bounded queue of search commands
pub struct SearchQueue {
    sender: mpsc::Sender<SearchJob>,
    pending: Arc<Mutex<HashSet<SearchCommand>>>,
}

impl SearchQueue {
    /// Start the queue with a custom processor
    pub fn new<F, Fut>(config: SearchQueueConfig, cancel: CancellationToken, processor: F) -> Self
    where
        F: Fn(SearchCommand) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (sender, mut receiver) = mpsc::channel::<SearchJob>(config.queue_capacity.max(1));
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        let pending: Arc<Mutex<HashSet<SearchCommand>>> = Arc::default();
        let processor = Arc::new(processor);

        let worker_pending = pending.clone();
        tokio::spawn(async move {
            info!(queue = "search", "Search queue started");

            loop {
                let job = tokio::select! {
                    _ = cancel.cancelled() => break,
                    job = receiver.recv() => match job {
                        Some(job) => job,
                        None => break,
                    },
                };

                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };
                let processor = processor.clone();
                let pending = worker_pending.clone();

                tokio::spawn(async move {
                    debug!(queue = "search", job_id = %job.id, command = %job.command, "Processing search");
                    processor(job.command.clone()).await;
                    pending.lock().remove(&job.command);
                    drop(permit);
                    debug!(queue = "search", job_id = %job.id, "Search completed");
                });

                if config.job_delay > Duration::ZERO {
                    tokio::time::sleep(config.job_delay).await;
                }
            }

            info!(queue = "search", "Search queue stopped");
        });

        Self { sender, pending }
    }

    /// Start the queue with the indexer-searching worker
    pub fn with_worker(worker: SearchWorker, config: SearchQueueConfig, cancel: CancellationToken) -> Self {
        let worker = Arc::new(worker);
        Self::new(config, cancel, move |command| {
            let worker = worker.clone();
            async move { worker.execute(command).await }
        })
    }

    /// Commands queued or running
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }
}

#[async_trait]
impl SearchDispatcher for SearchQueue {
    async fn dispatch(&self, command: SearchCommand) -> Result<()> {
        if !self.pending.lock().insert(command.clone()) {
            debug!(command = %command, "Search already pending");
            return Ok(());
        }

        let job = SearchJob {
            id: Uuid::new_v4(),
            command: command.clone(),
        };

        if self.sender.send(job).await.is_err() {
            self.pending.lock().remove(&command);
            return Err(anyhow!("Search queue is closed"));
        }

        debug!(command = %command, "Search queued");
        Ok(())
    }
}

/// Runs one search command against every searchable indexer
pub struct SearchWorker {
    series: Arc<dyn SeriesRepository>,
    searcher: Arc<dyn ReleaseSearcher>,
    pipeline: FeedIngestionPipeline,
    indexers: Arc<Vec<IndexerDefinition>>,
    cancel: CancellationToken,
}

impl SearchWorker {
    pub fn new(
        series: Arc<dyn SeriesRepository>,
        searcher: Arc<dyn ReleaseSearcher>,
        pipeline: FeedIngestionPipeline,
        indexers: Arc<Vec<IndexerDefinition>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            series,
            searcher,
            pipeline,
            indexers,
            cancel,
        }
    }

    pub async fn execute(&self, command: SearchCommand) {
        let series = match self.series.get(command.series_id()).await {
            Ok(Some(series)) => series,
            Ok(None) => {
                warn!(command = %command, "Search for unknown series dropped");
                return;
            }
            Err(e) => {
                warn!(command = %command, error = %e, "Failed to load series for search");
                return;
            }
        };

        let query = SearchQuery {
            series_title: series.title.clone(),
            season_number: command.season_number(),
            episode_number: match &command {
                SearchCommand::EpisodeSearch { episode_number, .. } => Some(*episode_number),
                SearchCommand::SeasonSearch { .. } => None,
            },
        };

        for indexer in self.indexers.iter().filter(|i| i.supports_search()) {
            if self.cancel.is_cancelled() {
                return;
            }

            let items = match self.searcher.search(indexer, &query).await {
                Ok(items) => items,
                Err(e) => {
                    warn!(indexer = %indexer.name, command = %command, error = %e, "Search failed");
                    continue;
                }
            };

            let report = self.pipeline.process_items(indexer, &items, &self.cancel).await;
            for failure in &report.failures {
                warn!(indexer = %indexer.name, command = %command, error = %failure, "Search result failed");
            }
            info!(
                indexer = %indexer.name,
                command = %command,
                results = report.items_seen,
                dispatched = report.dispatched.len(),
                "Search finished"
            );
        }
    }
}
