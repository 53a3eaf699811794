//! Episode records

use serde::{Deserialize, Serialize};

use crate::quality::Quality;

/// One episode of a series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub id: i64,
    pub series_id: i64,
    pub season_number: i32,
    pub episode_number: i32,
    #[serde(default)]
    pub title: Option<String>,
    /// The only signal of whether an episode is missing
    #[serde(default)]
    pub has_file: bool,
    #[serde(default)]
    pub file_quality: Option<Quality>,
}

impl EpisodeRecord {
    pub fn missing(id: i64, series_id: i64, season_number: i32, episode_number: i32) -> Self {
        Self {
            id,
            series_id,
            season_number,
            episode_number,
            title: None,
            has_file: false,
            file_quality: None,
        }
    }

    /// Specials (season 0) are never grouped into season searches
    pub fn is_special(&self) -> bool {
        self.season_number == 0
    }
}
