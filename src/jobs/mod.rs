//! Background job scheduling
//!
//! Two independent cron jobs share nothing but the collaborators they were
//! built with:
//! - `rss_sync`: polls every indexer feed through the ingestion pipeline
//! - `backlog_search`: turns missing episodes into searches
//!
//! A job whose previous run is still going skips its turn.

pub mod backlog_search;
pub mod rss_sync;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

pub use backlog_search::BacklogSearchJob;
pub use rss_sync::RssSyncJob;

/// Prevents a job from overlapping with itself
#[derive(Debug, Default)]
pub struct SingleFlight {
    running: AtomicBool,
}

/// Marks the job as running until dropped
pub struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl SingleFlight {
    pub fn try_begin(&self) -> Option<FlightGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard { flag: &self.running })
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Initialize and start the job scheduler
pub async fn start_scheduler(
    rss_sync: Arc<RssSyncJob>,
    rss_schedule: &str,
    backlog_search: Arc<BacklogSearchJob>,
    backlog_schedule: &str,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let job = rss_sync.clone();
    let rss_job = Job::new_async(rss_schedule, move |_uuid, _l| {
        let job = job.clone();
        Box::pin(async move {
            job.run().await;
        })
    })?;
    scheduler.add(rss_job).await?;

    let job = backlog_search.clone();
    let backlog_job = Job::new_async(backlog_schedule, move |_uuid, _l| {
        let job = job.clone();
        Box::pin(async move {
            job.run().await;
        })
    })?;
    scheduler.add(backlog_job).await?;

    scheduler.start().await?;

    info!(rss_sync = rss_schedule, backlog_search = backlog_schedule, "Job scheduler started");
    Ok(scheduler)
}
