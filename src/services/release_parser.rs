//! Release title parser for scene-style names
//!
//! Parses titles like:
//! - "Chicago.Fire.S14E08.720p.HDTV.x264-ETHEL"
//! - "Corner Gas S06E12E13 1080p WEB-DL DDP2 0 H 264-QOQ"
//! - "The Office 3x05 DVDRip XviD"
//! - "Fringe.S02.BluRay.720p.x264-GROUP" (full season)
//!
//! The pipeline only depends on [`ReleaseParser`]; [`SceneReleaseParser`] is the
//! default implementation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ReleaseParseError;
use crate::quality::{Quality, QualityTier};

/// Structured description of one release, produced from its title
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDescriptor {
    pub raw_title: String,
    /// Series name as written in the release
    pub series_title: String,
    /// Set once the title has been matched to a known series
    pub matched_series_id: Option<i64>,
    pub season_number: i32,
    /// Unique and ascending; empty only for full-season releases
    pub episode_numbers: Vec<i32>,
    pub quality: Quality,
    pub is_full_season: bool,
}

impl ReleaseDescriptor {
    pub fn is_proper(&self) -> bool {
        self.quality.is_proper
    }
}

/// Text to release descriptor capability
pub trait ReleaseParser: Send + Sync {
    /// `Ok(None)` means the title is not an episode release at all.
    fn parse(&self, title: &str) -> Result<Option<ReleaseDescriptor>, ReleaseParseError>;
}

static SXXEYY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?P<title>.+?)[\s._-]+s(?P<season>\d{1,2})(?P<episodes>(?:[\s._-]*e\d{1,3})+)(?:[\s._-]|$)")
        .expect("valid regex")
});

static NXNN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?P<title>.+?)[\s._-]+(?P<season>\d{1,2})x(?P<episodes>\d{2,3}(?:[-x]+\d{2,3})*)(?:[\s._-]|$)")
        .expect("valid regex")
});

static SEASON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?P<title>.+?)[\s._-]+(?:s|season[\s._-]*)(?P<season>\d{1,2})(?:[\s._-]|$)")
        .expect("valid regex")
});

static EPISODE_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,3})").expect("valid regex"));

static STOP_WORDS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(a|an|the|and|or|of)\b").expect("valid regex"));

static NON_ALNUM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]").expect("valid regex"));

static SEPARATOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[._]+|\s+").expect("valid regex"));

/// Default parser for scene naming conventions
#[derive(Debug, Clone, Default)]
pub struct SceneReleaseParser;

impl SceneReleaseParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_episodes(
        title: &str,
        raw: &str,
    ) -> Result<Vec<i32>, ReleaseParseError> {
        let mut numbers = Vec::new();
        for caps in EPISODE_NUMBER_RE.captures_iter(raw) {
            let value = &caps[1];
            let number: i32 = value.parse().map_err(|_| ReleaseParseError::InvalidNumber {
                title: title.to_string(),
                value: value.to_string(),
            })?;
            if let Some(&last) = numbers.last() {
                if number <= last {
                    return Err(ReleaseParseError::EpisodeOrder {
                        title: title.to_string(),
                    });
                }
            }
            numbers.push(number);
        }
        Ok(numbers)
    }

    fn parse_season(title: &str, raw: &str) -> Result<i32, ReleaseParseError> {
        raw.parse().map_err(|_| ReleaseParseError::InvalidNumber {
            title: title.to_string(),
            value: raw.to_string(),
        })
    }
}

impl ReleaseParser for SceneReleaseParser {
    fn parse(&self, title: &str) -> Result<Option<ReleaseDescriptor>, ReleaseParseError> {
        let title = title.trim();

        let (series, season, episodes, is_full_season) =
            if let Some(caps) = SXXEYY_RE.captures(title) {
                let season = Self::parse_season(title, &caps["season"])?;
                let episodes = Self::parse_episodes(title, &caps["episodes"])?;
                (caps["title"].to_string(), season, episodes, false)
            } else if let Some(caps) = NXNN_RE.captures(title) {
                let season = Self::parse_season(title, &caps["season"])?;
                let episodes = Self::parse_episodes(title, &caps["episodes"])?;
                (caps["title"].to_string(), season, episodes, false)
            } else if let Some(caps) = SEASON_RE.captures(title) {
                let season = Self::parse_season(title, &caps["season"])?;
                (caps["title"].to_string(), season, Vec::new(), true)
            } else {
                debug!(title = title, "No episode pattern in release title");
                return Ok(None);
            };

        if !is_full_season && episodes.is_empty() {
            return Ok(None);
        }

        let descriptor = ReleaseDescriptor {
            raw_title: title.to_string(),
            series_title: tidy_series_title(&series),
            matched_series_id: None,
            season_number: season,
            episode_numbers: episodes,
            quality: parse_quality(title),
            is_full_season,
        };

        debug!(
            title = title,
            series = %descriptor.series_title,
            season = descriptor.season_number,
            episodes = ?descriptor.episode_numbers,
            quality = %descriptor.quality,
            "Parsed release title"
        );

        Ok(Some(descriptor))
    }
}

/// Detect quality tier and proper flag from a release title
pub fn parse_quality(title: &str) -> Quality {
    let lower = title.to_lowercase();
    let is_proper = lower.contains("proper") || lower.contains("repack");
    let hd = lower.contains("720p") || lower.contains("1080p");

    let tier = if lower.contains("bluray") || lower.contains("blu-ray") {
        if lower.contains("1080p") {
            QualityTier::Bluray1080p
        } else {
            QualityTier::Bluray720p
        }
    } else if lower.contains("web-dl") || lower.contains("webdl") || lower.contains("web dl") {
        QualityTier::WebDl
    } else if hd && (lower.contains("hdtv") || lower.contains("x264")) {
        QualityTier::Hdtv
    } else if lower.contains("dvd") || lower.contains("bdrip") {
        QualityTier::Dvd
    } else if lower.contains("hdtv") || lower.contains("pdtv") || lower.contains("sdtv") || lower.contains("xvid") {
        QualityTier::Sdtv
    } else if hd {
        QualityTier::Hdtv
    } else {
        QualityTier::Unknown
    };

    Quality::new(tier, is_proper)
}

/// Normalize a series name for case and format insensitive matching
///
/// "The.Office (US)" and "office us" both become "officeus".
pub fn clean_title(name: &str) -> String {
    let lower = name.to_lowercase().replace('&', " and ");
    let spaced = SEPARATOR_RE.replace_all(&lower, " ");
    let without_stop_words = STOP_WORDS_RE.replace_all(&spaced, "");
    NON_ALNUM_RE.replace_all(&without_stop_words, "").to_string()
}

fn tidy_series_title(raw: &str) -> String {
    SEPARATOR_RE
        .replace_all(raw, " ")
        .trim_matches(|c: char| c == '-' || c.is_whitespace())
        .to_string()
}
