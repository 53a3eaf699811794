//! Indexer definitions and feed plumbing
//!
//! An indexer is a plain value: a name, one or more feed URLs, optional
//! credentials and a [`IndexerKind`]. The kind is the only place where
//! indexers differ in behavior:
//! - how the NZB download URL is derived from a feed item
//! - an optional refinement of the parsed release descriptor

pub mod feed;
pub mod search;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::quality::QualityTier;
use crate::services::release_parser::{ReleaseDescriptor, parse_quality};

pub use feed::{FeedFetcher, RssFeedFetcher, parse_feed};
pub use search::{NewznabSearcher, ReleaseSearcher, SearchQuery};

/// One entry from an indexer feed or search response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub enclosure_url: Option<String>,
    pub description: Option<String>,
    pub guid: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// `newznab:attr` name/value pairs
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl FeedItem {
    pub fn new(title: &str, link: &str) -> Self {
        Self {
            title: title.to_string(),
            link: link.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerCredentials {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl IndexerCredentials {
    /// Username/password pair for HTTP basic auth, if both are set
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) if !user.is_empty() => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexerKind {
    /// Plain RSS; the item link is the NZB
    #[default]
    Generic,
    /// Newznab API; NZB comes from the enclosure
    Newznab,
    NzbsOrg,
    Newzbin,
}

impl std::fmt::Display for IndexerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexerKind::Generic => write!(f, "generic"),
            IndexerKind::Newznab => write!(f, "newznab"),
            IndexerKind::NzbsOrg => write!(f, "nzbsorg"),
            IndexerKind::Newzbin => write!(f, "newzbin"),
        }
    }
}

impl std::str::FromStr for IndexerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "generic" | "rss" => Ok(IndexerKind::Generic),
            "newznab" => Ok(IndexerKind::Newznab),
            "nzbsorg" | "nzbs.org" => Ok(IndexerKind::NzbsOrg),
            "newzbin" => Ok(IndexerKind::Newzbin),
            _ => Err(anyhow::anyhow!("Unknown indexer kind: {}", s)),
        }
    }
}

impl IndexerKind {
    /// URL the download client should fetch the NZB from
    pub fn download_url(&self, item: &FeedItem) -> String {
        match self {
            IndexerKind::Generic => item.link.clone(),
            IndexerKind::Newznab => item
                .enclosure_url
                .clone()
                .unwrap_or_else(|| item.link.clone()),
            IndexerKind::NzbsOrg => item.link.replace("action=view", "action=getnzb"),
            IndexerKind::Newzbin => {
                let link = item.link.trim_end_matches('/');
                format!("{}/nzb", link)
            }
        }
    }

    /// Adjust a freshly parsed descriptor using what the feed item adds
    pub fn refine(&self, item: &FeedItem, mut descriptor: ReleaseDescriptor) -> ReleaseDescriptor {
        if *self == IndexerKind::Newzbin && descriptor.quality.tier == QualityTier::Unknown {
            // Newzbin titles often omit the format; the report description carries it
            if let Some(description) = &item.description {
                let inferred = parse_quality(description);
                if inferred.tier != QualityTier::Unknown {
                    debug!(
                        title = %item.title,
                        quality = %inferred.tier,
                        "Quality taken from Newzbin report description"
                    );
                    descriptor.quality.tier = inferred.tier;
                }
            }
        }
        descriptor
    }
}

/// One configured indexer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerDefinition {
    pub name: String,
    /// RSS feed URLs polled on every sync
    pub urls: Vec<String>,
    #[serde(default)]
    pub credentials: IndexerCredentials,
    #[serde(default)]
    pub kind: IndexerKind,
    /// Newznab API base used for backlog searches
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl IndexerDefinition {
    pub fn new(name: &str, urls: Vec<String>, kind: IndexerKind) -> Self {
        Self {
            name: name.to_string(),
            urls,
            credentials: IndexerCredentials::default(),
            kind,
            api_url: None,
            enabled: true,
        }
    }

    pub fn supports_search(&self) -> bool {
        self.enabled && self.api_url.is_some() && self.credentials.api_key.is_some()
    }
}
