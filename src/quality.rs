//! Release quality tiers and per-series quality profiles
//!
//! A [`Quality`] is a tier plus a "proper" flag. Proper is a modifier, never a
//! tier of its own: two releases of the same tier compare by tier first and only
//! then by proper status.

use serde::{Deserialize, Serialize};

/// Quality tier detected for a release, ordered worst to best
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityTier {
    Unknown,
    Sdtv,
    Dvd,
    Hdtv,
    WebDl,
    Bluray720p,
    Bluray1080p,
}

impl Default for QualityTier {
    fn default() -> Self {
        Self::Unknown
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityTier::Unknown => write!(f, "Unknown"),
            QualityTier::Sdtv => write!(f, "SDTV"),
            QualityTier::Dvd => write!(f, "DVD"),
            QualityTier::Hdtv => write!(f, "HDTV"),
            QualityTier::WebDl => write!(f, "WEBDL"),
            QualityTier::Bluray720p => write!(f, "Bluray720p"),
            QualityTier::Bluray1080p => write!(f, "Bluray1080p"),
        }
    }
}

impl std::str::FromStr for QualityTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unknown" => Ok(QualityTier::Unknown),
            "sdtv" => Ok(QualityTier::Sdtv),
            "dvd" => Ok(QualityTier::Dvd),
            "hdtv" => Ok(QualityTier::Hdtv),
            "webdl" | "web-dl" => Ok(QualityTier::WebDl),
            "bluray720p" => Ok(QualityTier::Bluray720p),
            "bluray1080p" => Ok(QualityTier::Bluray1080p),
            _ => Err(anyhow::anyhow!("Unknown quality tier: {}", s)),
        }
    }
}

/// Detected quality of a release or file
///
/// Field order matters: the derived ordering compares `tier` before `is_proper`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Quality {
    pub tier: QualityTier,
    pub is_proper: bool,
}

impl Quality {
    pub fn new(tier: QualityTier, is_proper: bool) -> Self {
        Self { tier, is_proper }
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_proper {
            write!(f, "{} Proper", self.tier)
        } else {
            write!(f, "{}", self.tier)
        }
    }
}

/// Quality policy configured on a series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityProfile {
    pub name: String,
    /// Tiers this profile accepts at all
    pub allowed: Vec<QualityTier>,
    /// Lowest tier accepted as a non-proper; once a file reaches it, tier upgrades stop
    pub cutoff: QualityTier,
    /// Accept propers below the cutoff, and same-tier proper upgrades at or above it
    #[serde(default)]
    pub allow_proper_upgrades: bool,
}

impl QualityProfile {
    /// Profile accepting every known tier
    pub fn any() -> Self {
        Self {
            name: "Any".to_string(),
            allowed: vec![
                QualityTier::Sdtv,
                QualityTier::Dvd,
                QualityTier::Hdtv,
                QualityTier::WebDl,
                QualityTier::Bluray720p,
                QualityTier::Bluray1080p,
            ],
            cutoff: QualityTier::Sdtv,
            allow_proper_upgrades: true,
        }
    }

    pub fn allows(&self, tier: QualityTier) -> bool {
        self.allowed.contains(&tier)
    }
}
