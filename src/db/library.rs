//! In-memory series and episode catalogue
//!
//! The catalogue is loaded once from a JSON snapshot:
//!
//! ```json
//! {
//!   "series": [{ "id": 1, "title": "Chicago Fire", "quality_profile": { ... } }],
//!   "episodes": [{ "id": 10, "series_id": 1, "season_number": 14, "episode_number": 8 }]
//! }
//! ```
//!
//! Series without a `clean_title` get one derived from their title on load.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{EpisodeRecord, EpisodeRepository, SeasonRepository, SeriesRecord, SeriesRepository};
use crate::services::release_parser::{ReleaseDescriptor, clean_title};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibrarySnapshot {
    #[serde(default)]
    pub series: Vec<SeriesRecord>,
    #[serde(default)]
    pub episodes: Vec<EpisodeRecord>,
}

/// Series, season and episode repositories over one shared snapshot
#[derive(Debug, Default)]
pub struct Library {
    inner: RwLock<LibrarySnapshot>,
}

impl Library {
    pub fn new(mut snapshot: LibrarySnapshot) -> Self {
        for series in &mut snapshot.series {
            if series.clean_title.is_empty() {
                series.clean_title = clean_title(&series.title);
            }
        }
        Self {
            inner: RwLock::new(snapshot),
        }
    }

    /// Load a snapshot file written as JSON
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read library snapshot {}", path.display()))?;
        let snapshot: LibrarySnapshot = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid library snapshot {}", path.display()))?;

        let library = Self::new(snapshot);
        info!(
            path = %path.display(),
            series = library.series_count(),
            episodes = library.episode_count(),
            "Loaded library snapshot"
        );

        Ok(library)
    }

    pub fn series_count(&self) -> usize {
        self.inner.read().series.len()
    }

    pub fn episode_count(&self) -> usize {
        self.inner.read().episodes.len()
    }
}

#[async_trait]
impl SeriesRepository for Library {
    async fn get(&self, series_id: i64) -> Result<Option<SeriesRecord>> {
        Ok(self
            .inner
            .read()
            .series
            .iter()
            .find(|s| s.id == series_id)
            .cloned())
    }

    async fn find_by_clean_title(&self, clean: &str) -> Result<Option<SeriesRecord>> {
        Ok(self
            .inner
            .read()
            .series
            .iter()
            .find(|s| s.clean_title == clean)
            .cloned())
    }
}

#[async_trait]
impl SeasonRepository for Library {
    async fn is_ignored(&self, series_id: i64, season_number: i32) -> Result<bool> {
        Ok(self
            .inner
            .read()
            .series
            .iter()
            .find(|s| s.id == series_id)
            .is_some_and(|s| s.is_season_ignored(season_number)))
    }

    async fn episode_numbers_of_season(
        &self,
        series_id: i64,
        season_number: i32,
    ) -> Result<BTreeSet<i32>> {
        Ok(self
            .inner
            .read()
            .episodes
            .iter()
            .filter(|e| e.series_id == series_id && e.season_number == season_number)
            .map(|e| e.episode_number)
            .collect())
    }
}

#[async_trait]
impl EpisodeRepository for Library {
    async fn episodes_for_descriptor(&self, descriptor: &ReleaseDescriptor) -> Result<Vec<EpisodeRecord>> {
        let series_id = descriptor
            .matched_series_id
            .with_context(|| format!("Release '{}' is not matched to a series", descriptor.raw_title))?;

        let inner = self.inner.read();
        let mut episodes: Vec<EpisodeRecord> = inner
            .episodes
            .iter()
            .filter(|e| e.series_id == series_id && e.season_number == descriptor.season_number)
            .filter(|e| descriptor.is_full_season || descriptor.episode_numbers.contains(&e.episode_number))
            .cloned()
            .collect();
        episodes.sort_by_key(|e| e.episode_number);
        Ok(episodes)
    }

    async fn episodes_without_files(&self, monitored_only: bool) -> Result<Vec<EpisodeRecord>> {
        let inner = self.inner.read();
        let mut episodes: Vec<EpisodeRecord> = inner
            .episodes
            .iter()
            .filter(|e| !e.has_file)
            .filter(|e| {
                if !monitored_only {
                    return true;
                }
                inner
                    .series
                    .iter()
                    .find(|s| s.id == e.series_id)
                    .is_some_and(|s| s.monitored && !s.is_season_ignored(e.season_number))
            })
            .cloned()
            .collect();
        episodes.sort_by_key(|e| (e.series_id, e.season_number, e.episode_number));
        Ok(episodes)
    }
}
