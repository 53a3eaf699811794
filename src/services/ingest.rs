//! Feed ingestion pipeline
//!
//! For every configured indexer feed:
//! 1. Fetch the feed (a failing feed is recorded and skipped)
//! 2. Take each item through parse, match, policy gates and dedup
//! 3. Submit accepted releases to the download client and record history
//!
//! A problem with one item never stops the rest of its feed, and a problem with
//! one feed never stops the others. Every failure is returned to the caller.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::db::{EpisodeRecord, EpisodeRepository, SeasonRepository, SeriesRecord, SeriesRepository};
use crate::error::{Failure, ItemProcessingError};
use crate::indexer::{FeedFetcher, FeedItem, IndexerDefinition};
use crate::quality::{Quality, QualityProfile};
use crate::services::download_client::{DownloadClient, download_title};
use crate::services::history::HistoryLedger;
use crate::services::quality_evaluator::QualityEvaluator;
use crate::services::release_parser::{ReleaseDescriptor, ReleaseParser, clean_title};

/// Why an item was dropped without error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    Unparseable,
    UnknownSeries,
    NotMonitored,
    QualityRejected,
    SeasonIgnored,
    NotNeeded,
    InHistory,
    AlreadyQueued,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Unparseable => write!(f, "unparseable"),
            SkipReason::UnknownSeries => write!(f, "unknown_series"),
            SkipReason::NotMonitored => write!(f, "not_monitored"),
            SkipReason::QualityRejected => write!(f, "quality_rejected"),
            SkipReason::SeasonIgnored => write!(f, "season_ignored"),
            SkipReason::NotNeeded => write!(f, "not_needed"),
            SkipReason::InHistory => write!(f, "in_history"),
            SkipReason::AlreadyQueued => write!(f, "already_queued"),
        }
    }
}

/// Result of taking one item through the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Dispatched { title: String, episode_ids: Vec<i64> },
    Skipped(SkipReason),
}

/// Counters and failures from one sweep
#[derive(Debug, Default)]
pub struct IngestReport {
    pub feeds_fetched: usize,
    pub items_seen: usize,
    /// Download titles handed to the download client
    pub dispatched: Vec<String>,
    pub skipped: HashMap<SkipReason, usize>,
    pub failures: Vec<Failure>,
    /// The sweep stopped early on request
    pub cancelled: bool,
}

impl IngestReport {
    pub fn skipped_for(&self, reason: SkipReason) -> usize {
        self.skipped.get(&reason).copied().unwrap_or(0)
    }

    fn record(&mut self, outcome: Result<ItemOutcome, Failure>) {
        self.items_seen += 1;
        match outcome {
            Ok(ItemOutcome::Dispatched { title, .. }) => self.dispatched.push(title),
            Ok(ItemOutcome::Skipped(reason)) => *self.skipped.entry(reason).or_insert(0) += 1,
            Err(failure) => self.failures.push(failure),
        }
    }

    pub fn merge(&mut self, other: IngestReport) {
        self.feeds_fetched += other.feeds_fetched;
        self.items_seen += other.items_seen;
        self.dispatched.extend(other.dispatched);
        for (reason, count) in other.skipped {
            *self.skipped.entry(reason).or_insert(0) += count;
        }
        self.failures.extend(other.failures);
        self.cancelled |= other.cancelled;
    }
}

/// Everything the pipeline talks to
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn FeedFetcher>,
    pub parser: Arc<dyn ReleaseParser>,
    pub series: Arc<dyn SeriesRepository>,
    pub seasons: Arc<dyn SeasonRepository>,
    pub episodes: Arc<dyn EpisodeRepository>,
    pub history: HistoryLedger,
    pub download_client: Arc<dyn DownloadClient>,
}

/// A release that passed every gate
struct AcceptedRelease {
    series: SeriesRecord,
    descriptor: ReleaseDescriptor,
    episodes: Vec<EpisodeRecord>,
}

enum Decision {
    Accept(AcceptedRelease),
    Skip(SkipReason),
}

#[derive(Clone)]
pub struct FeedIngestionPipeline {
    deps: Collaborators,
    max_concurrent_feeds: usize,
}

impl FeedIngestionPipeline {
    pub fn new(deps: Collaborators, max_concurrent_feeds: usize) -> Self {
        Self {
            deps,
            max_concurrent_feeds: max_concurrent_feeds.max(1),
        }
    }

    /// Process every feed of every enabled indexer, returning the failures
    pub async fn ingest(&self, indexers: &[IndexerDefinition]) -> Vec<Failure> {
        self.run(indexers, &CancellationToken::new()).await.failures
    }

    /// Like [`ingest`](Self::ingest), with counters and cooperative cancellation
    pub async fn run(&self, indexers: &[IndexerDefinition], cancel: &CancellationToken) -> IngestReport {
        let feeds: Vec<(&IndexerDefinition, &str)> = indexers
            .iter()
            .filter(|indexer| indexer.enabled)
            .flat_map(|indexer| indexer.urls.iter().map(move |url| (indexer, url.as_str())))
            .collect();

        info!(feeds = feeds.len(), "Starting feed ingestion");

        let sweeps: Vec<_> = feeds
            .into_iter()
            .map(|(indexer, url)| self.ingest_feed(indexer, url, cancel))
            .collect();

        let reports: Vec<IngestReport> = stream::iter(sweeps)
            .buffered(self.max_concurrent_feeds)
            .collect()
            .await;

        let mut report = IngestReport::default();
        for feed_report in reports {
            report.merge(feed_report);
        }

        info!(
            feeds = report.feeds_fetched,
            items = report.items_seen,
            dispatched = report.dispatched.len(),
            failures = report.failures.len(),
            cancelled = report.cancelled,
            "Feed ingestion finished"
        );

        report
    }

    async fn ingest_feed(&self, indexer: &IndexerDefinition, url: &str, cancel: &CancellationToken) -> IngestReport {
        if cancel.is_cancelled() {
            return IngestReport {
                cancelled: true,
                ..Default::default()
            };
        }

        let items = match self.deps.fetcher.fetch(url, &indexer.credentials).await {
            Ok(items) => items,
            Err(error) => {
                warn!(indexer = %indexer.name, url = %url, error = %error, "Failed to fetch feed");
                return IngestReport {
                    failures: vec![Failure::Fetch {
                        indexer: indexer.name.clone(),
                        error,
                    }],
                    ..Default::default()
                };
            }
        };

        debug!(indexer = %indexer.name, url = %url, items = items.len(), "Fetched feed");

        let mut report = self.process_items(indexer, &items, cancel).await;
        report.feeds_fetched += 1;
        report
    }

    /// Take items through the pipeline in order
    pub async fn process_items(
        &self,
        indexer: &IndexerDefinition,
        items: &[FeedItem],
        cancel: &CancellationToken,
    ) -> IngestReport {
        let mut report = IngestReport::default();

        for item in items {
            if cancel.is_cancelled() {
                info!(indexer = %indexer.name, "Ingestion cancelled");
                report.cancelled = true;
                break;
            }

            let outcome = self.process_item(indexer, item).await;
            if let Err(failure) = &outcome {
                warn!(indexer = %indexer.name, title = %item.title, error = %failure, "Failed to process feed item");
            }
            report.record(outcome);
        }

        report
    }

    /// Run a single item through every stage
    pub async fn process_item(&self, indexer: &IndexerDefinition, item: &FeedItem) -> Result<ItemOutcome, Failure> {
        let decision = self
            .evaluate(indexer, item)
            .await
            .map_err(|e| Failure::Item(ItemProcessingError::new(&indexer.name, &item.title, e)))?;

        match decision {
            Decision::Skip(reason) => {
                debug!(indexer = %indexer.name, title = %item.title, reason = %reason, "Skipping release");
                Ok(ItemOutcome::Skipped(reason))
            }
            Decision::Accept(release) => self.dispatch(indexer, item, release).await,
        }
    }

    async fn evaluate(&self, indexer: &IndexerDefinition, item: &FeedItem) -> Result<Decision> {
        let Some(parsed) = self.deps.parser.parse(&item.title)? else {
            return Ok(Decision::Skip(SkipReason::Unparseable));
        };
        let mut descriptor = indexer.kind.refine(item, parsed);

        let Some(series) = self
            .deps
            .series
            .find_by_clean_title(&clean_title(&descriptor.series_title))
            .await?
        else {
            return Ok(Decision::Skip(SkipReason::UnknownSeries));
        };
        descriptor.matched_series_id = Some(series.id);

        if !self.deps.series.is_monitored(series.id).await? {
            return Ok(Decision::Skip(SkipReason::NotMonitored));
        }

        if !self.deps.series.quality_wanted(series.id, descriptor.quality).await? {
            return Ok(Decision::Skip(SkipReason::QualityRejected));
        }

        if self.deps.seasons.is_ignored(series.id, descriptor.season_number).await? {
            return Ok(Decision::Skip(SkipReason::SeasonIgnored));
        }

        let episodes = self.deps.episodes.episodes_for_descriptor(&descriptor).await?;
        if !is_needed(&series.quality_profile, &episodes, descriptor.quality) {
            return Ok(Decision::Skip(SkipReason::NotNeeded));
        }

        for episode in &episodes {
            if self.deps.history.is_satisfied(episode.id, descriptor.quality).await? {
                return Ok(Decision::Skip(SkipReason::InHistory));
            }
        }

        Ok(Decision::Accept(AcceptedRelease {
            series,
            descriptor,
            episodes,
        }))
    }

    async fn dispatch(
        &self,
        indexer: &IndexerDefinition,
        item: &FeedItem,
        release: AcceptedRelease,
    ) -> Result<ItemOutcome, Failure> {
        let title = download_title(&release.series.title, &release.descriptor, &release.episodes);
        let url = indexer.kind.download_url(item);

        let submission_failure = |error| Failure::Submission {
            title: title.clone(),
            error,
        };

        if self
            .deps
            .download_client
            .is_in_queue(&title)
            .await
            .map_err(submission_failure)?
        {
            debug!(indexer = %indexer.name, title = %title, "Release already queued");
            return Ok(ItemOutcome::Skipped(SkipReason::AlreadyQueued));
        }

        self.deps
            .download_client
            .submit(&url, &title)
            .await
            .map_err(submission_failure)?;

        let mut episode_ids = Vec::with_capacity(release.episodes.len());
        for episode in &release.episodes {
            self.deps
                .history
                .record(episode.id, release.descriptor.quality, &item.title, &indexer.name)
                .await
                .map_err(|e| Failure::Item(ItemProcessingError::new(&indexer.name, &item.title, e)))?;
            episode_ids.push(episode.id);
        }

        info!(
            indexer = %indexer.name,
            title = %title,
            release = %item.title,
            episodes = ?episode_ids,
            "Release sent to download client"
        );

        Ok(ItemOutcome::Dispatched { title, episode_ids })
    }
}

/// A release is needed when a targeted episode has no file, or has a file the
/// release would be a wanted upgrade over
fn is_needed(profile: &QualityProfile, episodes: &[EpisodeRecord], candidate: Quality) -> bool {
    episodes.iter().any(|episode| {
        !episode.has_file
            || episode
                .file_quality
                .is_some_and(|existing| QualityEvaluator::is_wanted_upgrade(profile, existing, candidate))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::QualityTier;

    fn profile() -> QualityProfile {
        QualityProfile {
            name: "HD".to_string(),
            allowed: vec![QualityTier::Sdtv, QualityTier::Hdtv, QualityTier::Bluray720p],
            cutoff: QualityTier::Bluray720p,
            allow_proper_upgrades: false,
        }
    }

    fn with_file(quality: Quality) -> EpisodeRecord {
        let mut episode = EpisodeRecord::missing(1, 1, 1, 1);
        episode.has_file = true;
        episode.file_quality = Some(quality);
        episode
    }

    #[test]
    fn test_missing_episode_is_needed() {
        let episodes = vec![EpisodeRecord::missing(1, 1, 1, 1)];
        assert!(is_needed(&profile(), &episodes, Quality::new(QualityTier::Sdtv, false)));
    }

    #[test]
    fn test_no_resolved_episodes_is_not_needed() {
        assert!(!is_needed(&profile(), &[], Quality::new(QualityTier::Hdtv, false)));
    }

    #[test]
    fn test_upgrade_over_existing_file_is_needed() {
        let episodes = vec![with_file(Quality::new(QualityTier::Sdtv, false))];
        assert!(is_needed(&profile(), &episodes, Quality::new(QualityTier::Bluray720p, false)));
        assert!(!is_needed(&profile(), &episodes, Quality::new(QualityTier::Sdtv, false)));
        // Below the cutoff and not proper: never acceptable, so never an upgrade
        assert!(!is_needed(&profile(), &episodes, Quality::new(QualityTier::Hdtv, false)));
    }

    #[test]
    fn test_file_without_known_quality_is_not_needed() {
        let mut episode = EpisodeRecord::missing(1, 1, 1, 1);
        episode.has_file = true;
        assert!(!is_needed(&profile(), &[episode], Quality::new(QualityTier::Bluray720p, false)));
    }

    #[test]
    fn test_report_merge() {
        let mut a = IngestReport::default();
        a.record(Ok(ItemOutcome::Skipped(SkipReason::UnknownSeries)));
        let mut b = IngestReport::default();
        b.record(Ok(ItemOutcome::Skipped(SkipReason::UnknownSeries)));
        b.record(Ok(ItemOutcome::Dispatched {
            title: "x".to_string(),
            episode_ids: vec![1],
        }));
        b.cancelled = true;

        a.merge(b);
        assert_eq!(a.items_seen, 3);
        assert_eq!(a.skipped_for(SkipReason::UnknownSeries), 2);
        assert_eq!(a.dispatched, vec!["x".to_string()]);
        assert!(a.cancelled);
    }
}
