//! Acquisition services

pub mod backlog;
pub mod download_client;
pub mod history;
pub mod ingest;
pub mod logging;
pub mod quality_evaluator;
pub mod rate_limiter;
pub mod release_parser;
pub mod search_queue;

pub use backlog::{BacklogAnalyzer, BacklogReport, BacklogSweep, SearchCommand, SearchDispatcher};
pub use download_client::{DownloadClient, SabnzbdClient, SabnzbdConfig, download_title};
pub use history::HistoryLedger;
pub use ingest::{Collaborators, FeedIngestionPipeline, IngestReport, ItemOutcome, SkipReason};
pub use quality_evaluator::QualityEvaluator;
pub use rate_limiter::{RateLimitedClient, RetryConfig};
pub use release_parser::{ReleaseDescriptor, ReleaseParser, SceneReleaseParser};
pub use search_queue::{SearchQueue, SearchQueueConfig, SearchWorker};
