//! Series records

use serde::{Deserialize, Serialize};

use crate::quality::QualityProfile;
use crate::services::release_parser::clean_title;

/// A TV series known to the library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesRecord {
    pub id: i64,
    pub title: String,
    /// Normalized title; derived from `title` when absent in a snapshot
    #[serde(default)]
    pub clean_title: String,
    #[serde(default = "default_monitored")]
    pub monitored: bool,
    pub quality_profile: QualityProfile,
    #[serde(default)]
    pub ignored_seasons: Vec<i32>,
}

fn default_monitored() -> bool {
    true
}

impl SeriesRecord {
    pub fn new(id: i64, title: &str, quality_profile: QualityProfile) -> Self {
        Self {
            id,
            title: title.to_string(),
            clean_title: clean_title(title),
            monitored: true,
            quality_profile,
            ignored_seasons: Vec::new(),
        }
    }

    pub fn is_season_ignored(&self, season_number: i32) -> bool {
        self.ignored_seasons.contains(&season_number)
    }
}
