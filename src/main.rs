//! tvhound service entry point
//!
//! Wires the library snapshot, history database, indexers and SABnzbd client
//! into the two scheduled jobs and runs until Ctrl+C.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tvhound::config::Config;
use tvhound::db::{Library, SqliteHistoryRepository};
use tvhound::indexer::{NewznabSearcher, RssFeedFetcher};
use tvhound::jobs::{self, BacklogSearchJob, RssSyncJob};
use tvhound::services::logging::init_tracing;
use tvhound::services::{
    BacklogSweep, Collaborators, FeedIngestionPipeline, HistoryLedger, RateLimitedClient,
    RetryConfig, SabnzbdClient, SceneReleaseParser, SearchQueue, SearchQueueConfig, SearchWorker,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    init_tracing(config.log_json)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting tvhound");

    let library = Arc::new(Library::load(&config.library_path)?);
    let history = Arc::new(
        SqliteHistoryRepository::connect(&config.history_db)
            .await
            .context("Failed to open history database")?,
    );
    info!(db = %config.history_db, "History database ready");

    let indexer_http = RateLimitedClient::for_indexers(config.http_timeout)?;
    let fetcher = RssFeedFetcher::new(indexer_http, RetryConfig::default());

    let sab = Arc::new(SabnzbdClient::new(
        config.sabnzbd.clone(),
        RateLimitedClient::for_download_client(config.http_timeout)?,
    ));
    match sab.categories().await {
        Ok(categories) if !categories.contains(&config.sabnzbd.category) => {
            warn!(category = %config.sabnzbd.category, available = ?categories, "SABnzbd category not found");
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Could not reach SABnzbd, continuing"),
    }

    let cancel = CancellationToken::new();
    let indexers = Arc::new(config.indexers.clone());
    if indexers.is_empty() {
        warn!("No indexers configured; RSS sync and searches will do nothing");
    }

    let pipeline = FeedIngestionPipeline::new(
        Collaborators {
            fetcher: Arc::new(fetcher.clone()),
            parser: Arc::new(SceneReleaseParser::new()),
            series: library.clone(),
            seasons: library.clone(),
            episodes: library.clone(),
            history: HistoryLedger::new(history),
            download_client: sab,
        },
        config.max_concurrent_feeds,
    );

    let search_queue = Arc::new(SearchQueue::with_worker(
        SearchWorker::new(
            library.clone(),
            Arc::new(NewznabSearcher::new(fetcher)),
            pipeline.clone(),
            indexers.clone(),
            cancel.clone(),
        ),
        SearchQueueConfig::default(),
        cancel.clone(),
    ));

    let rss_job = Arc::new(RssSyncJob::new(pipeline, indexers, cancel.clone()));
    let backlog_job = Arc::new(BacklogSearchJob::new(
        BacklogSweep::new(library.clone(), library, search_queue),
        cancel.clone(),
    ));

    let mut scheduler = jobs::start_scheduler(
        rss_job,
        &config.rss_sync_schedule,
        backlog_job,
        &config.backlog_schedule,
    )
    .await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down");
    cancel.cancel();
    scheduler.shutdown().await?;

    Ok(())
}
