//! History ledger
//!
//! Answers whether an episode has already been acquired at a given quality and
//! records new acquisitions. Sits on top of any [`HistoryRepository`].

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::db::{HistoryEntry, HistoryRepository};
use crate::quality::Quality;

#[derive(Clone)]
pub struct HistoryLedger {
    repo: Arc<dyn HistoryRepository>,
}

impl HistoryLedger {
    pub fn new(repo: Arc<dyn HistoryRepository>) -> Self {
        Self { repo }
    }

    /// Whether an entry at equal-or-better quality already exists
    ///
    /// Tier is compared first, then the proper flag, so an HDTV proper entry
    /// satisfies both HDTV and HDTV proper candidates while a plain HDTV entry
    /// does not satisfy an HDTV proper.
    pub async fn is_satisfied(&self, episode_id: i64, quality: Quality) -> Result<bool> {
        // Exact hits are the common case and can be answered by the store directly
        if self.repo.exists(episode_id, quality).await? {
            return Ok(true);
        }

        let best = self
            .repo
            .list_for_episode(episode_id)
            .await?
            .iter()
            .map(HistoryEntry::full_quality)
            .max();

        let satisfied = best.is_some_and(|best| best >= quality);
        debug!(
            episode_id = episode_id,
            candidate = %quality,
            best = ?best,
            satisfied = satisfied,
            "Checked history"
        );
        Ok(satisfied)
    }

    /// Append an acquisition; duplicates are kept, never rejected
    pub async fn record(&self, episode_id: i64, quality: Quality, release_title: &str, indexer: &str) -> Result<()> {
        self.repo
            .add(&HistoryEntry::new(episode_id, quality, release_title, indexer))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryHistoryRepository;
    use crate::quality::QualityTier;

    fn ledger() -> HistoryLedger {
        HistoryLedger::new(Arc::new(MemoryHistoryRepository::new()))
    }

    #[tokio::test]
    async fn test_record_then_satisfied() {
        let ledger = ledger();
        let hdtv = Quality::new(QualityTier::Hdtv, false);

        assert!(!ledger.is_satisfied(7, hdtv).await.unwrap());
        ledger.record(7, hdtv, "Show.S01E07.720p.HDTV", "nzbs").await.unwrap();
        assert!(ledger.is_satisfied(7, hdtv).await.unwrap());
    }

    #[tokio::test]
    async fn test_better_entry_satisfies_lower_candidate() {
        let ledger = ledger();
        ledger
            .record(7, Quality::new(QualityTier::Bluray720p, false), "a", "nzbs")
            .await
            .unwrap();

        assert!(ledger.is_satisfied(7, Quality::new(QualityTier::Hdtv, true)).await.unwrap());
        assert!(!ledger.is_satisfied(7, Quality::new(QualityTier::Bluray1080p, false)).await.unwrap());
    }

    #[tokio::test]
    async fn test_proper_not_satisfied_by_non_proper() {
        let ledger = ledger();
        ledger
            .record(7, Quality::new(QualityTier::Hdtv, false), "a", "nzbs")
            .await
            .unwrap();

        assert!(!ledger.is_satisfied(7, Quality::new(QualityTier::Hdtv, true)).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_record_is_not_an_error() {
        let repo = Arc::new(MemoryHistoryRepository::new());
        let ledger = HistoryLedger::new(repo.clone());
        let dvd = Quality::new(QualityTier::Dvd, false);

        ledger.record(3, dvd, "a", "nzbs").await.unwrap();
        ledger.record(3, dvd, "a", "nzbs").await.unwrap();
        assert_eq!(repo.list_for_episode(3).await.unwrap().len(), 2);
    }
}
