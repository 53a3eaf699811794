//! Storage collaborators consumed by the acquisition core
//!
//! The core only ever talks to the repository traits below. Two backends ship
//! with the crate: [`Library`], an in-memory series/episode catalogue loaded from
//! a JSON snapshot, and the history stores in [`history`].

pub mod episodes;
pub mod history;
pub mod library;
pub mod series;

use std::collections::BTreeSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::quality::Quality;
use crate::services::quality_evaluator::QualityEvaluator;
use crate::services::release_parser::ReleaseDescriptor;

pub use episodes::EpisodeRecord;
pub use history::{HistoryEntry, MemoryHistoryRepository, SqliteHistoryRepository};
pub use library::{Library, LibrarySnapshot};
pub use series::SeriesRecord;

/// Read access to series
#[async_trait]
pub trait SeriesRepository: Send + Sync {
    async fn get(&self, series_id: i64) -> Result<Option<SeriesRecord>>;

    /// Look up a series by its normalized title
    async fn find_by_clean_title(&self, clean_title: &str) -> Result<Option<SeriesRecord>>;

    async fn is_monitored(&self, series_id: i64) -> Result<bool> {
        Ok(self.get(series_id).await?.is_some_and(|s| s.monitored))
    }

    /// Whether the series' quality profile accepts `quality`
    async fn quality_wanted(&self, series_id: i64, quality: Quality) -> Result<bool> {
        Ok(self
            .get(series_id)
            .await?
            .is_some_and(|s| QualityEvaluator::accepts(&s.quality_profile, quality)))
    }
}

/// Read access to season state
#[async_trait]
pub trait SeasonRepository: Send + Sync {
    async fn is_ignored(&self, series_id: i64, season_number: i32) -> Result<bool>;

    /// Every known episode number of a season, whether or not it has a file
    async fn episode_numbers_of_season(
        &self,
        series_id: i64,
        season_number: i32,
    ) -> Result<BTreeSet<i32>>;
}

/// Read access to episodes
#[async_trait]
pub trait EpisodeRepository: Send + Sync {
    /// Episodes targeted by a matched descriptor (the whole season for full-season releases)
    async fn episodes_for_descriptor(&self, descriptor: &ReleaseDescriptor) -> Result<Vec<EpisodeRecord>>;

    /// Episodes lacking a file, ordered by series, season and episode number
    async fn episodes_without_files(&self, monitored_only: bool) -> Result<Vec<EpisodeRecord>>;
}

/// Append-only acquisition history
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Exact match on episode, quality tier and proper flag
    async fn exists(&self, episode_id: i64, quality: Quality) -> Result<bool>;

    async fn add(&self, entry: &HistoryEntry) -> Result<()>;

    async fn list_for_episode(&self, episode_id: i64) -> Result<Vec<HistoryEntry>>;
}
