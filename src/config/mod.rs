//! Application configuration management
//!
//! Everything comes from environment variables, optionally seeded from a `.env`
//! file by `main`.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::indexer::IndexerDefinition;
use crate::services::download_client::{SabPriority, SabnzbdConfig};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// JSON snapshot of series and episodes
    pub library_path: PathBuf,

    /// SQLite URL of the history database
    pub history_db: String,

    /// Indexers to poll and search
    pub indexers: Vec<IndexerDefinition>,

    pub sabnzbd: SabnzbdConfig,

    /// Cron expression (with seconds) for the RSS sync job
    pub rss_sync_schedule: String,

    /// Cron expression (with seconds) for the backlog search job
    pub backlog_schedule: String,

    pub max_concurrent_feeds: usize,

    pub http_timeout: Duration,

    /// Emit JSON logs (default) or human readable ones
    pub log_json: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let indexers = match var("TVHOUND_INDEXERS") {
            Some(raw) => parse_indexers(&raw)?,
            None => Vec::new(),
        };

        Ok(Self {
            library_path: PathBuf::from(get("TVHOUND_LIBRARY_PATH", "./data/library.json")),

            history_db: get("TVHOUND_HISTORY_DB", "sqlite://./data/history.db"),

            indexers,

            sabnzbd: SabnzbdConfig {
                host: get("SAB_HOST", "localhost"),
                port: get("SAB_PORT", "8080").parse().context("Invalid SAB_PORT")?,
                api_key: get("SAB_API_KEY", ""),
                username: get("SAB_USERNAME", ""),
                password: get("SAB_PASSWORD", ""),
                category: get("SAB_TV_CATEGORY", "tv"),
                priority: get("SAB_TV_PRIORITY", "normal")
                    .parse::<SabPriority>()
                    .context("Invalid SAB_TV_PRIORITY")?,
            },

            rss_sync_schedule: get("RSS_SYNC_SCHEDULE", "0 */15 * * * *"),

            backlog_schedule: get("BACKLOG_SCHEDULE", "0 0 */6 * * *"),

            max_concurrent_feeds: get("MAX_CONCURRENT_FEEDS", "4")
                .parse()
                .context("Invalid MAX_CONCURRENT_FEEDS")?,

            http_timeout: Duration::from_secs(
                get("HTTP_TIMEOUT_SECS", "30")
                    .parse()
                    .context("Invalid HTTP_TIMEOUT_SECS")?,
            ),

            log_json: get("LOG_FORMAT", "json") != "pretty",
        })
    }
}

/// Indexers are given inline as a JSON array, or as a path to a JSON file
fn parse_indexers(raw: &str) -> Result<Vec<IndexerDefinition>> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("Invalid TVHOUND_INDEXERS JSON");
    }

    let content = std::fs::read_to_string(trimmed)
        .with_context(|| format!("Failed to read indexer file {}", trimmed))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid indexer file {}", trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::IndexerKind;
    use std::collections::HashMap;
    use std::io::Write;
    use tokio_test::assert_err;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.library_path, PathBuf::from("./data/library.json"));
        assert_eq!(config.sabnzbd.port, 8080);
        assert_eq!(config.sabnzbd.category, "tv");
        assert_eq!(config.sabnzbd.priority, SabPriority::Normal);
        assert_eq!(config.rss_sync_schedule, "0 */15 * * * *");
        assert_eq!(config.max_concurrent_feeds, 4);
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert!(config.indexers.is_empty());
        assert!(config.log_json);
    }

    #[test]
    fn test_inline_indexers() {
        let config = config(&[(
            "TVHOUND_INDEXERS",
            r#"[{"name": "nzbs", "urls": ["http://nzbs.org/rss.php"], "kind": "nzbsorg"}]"#,
        )])
        .unwrap();
        assert_eq!(config.indexers.len(), 1);
        assert_eq!(config.indexers[0].kind, IndexerKind::NzbsOrg);
    }

    #[test]
    fn test_indexers_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"name": "geek", "urls": [], "kind": "newznab"}}]"#).unwrap();

        let path = file.path().to_string_lossy().to_string();
        let config = config(&[("TVHOUND_INDEXERS", path.as_str())]).unwrap();
        assert_eq!(config.indexers[0].name, "geek");
    }

    #[test]
    fn test_invalid_values_are_errors() {
        assert_err!(config(&[("SAB_PORT", "not-a-port")]));
        assert_err!(config(&[("SAB_TV_PRIORITY", "urgent")]));
        assert_err!(config(&[("TVHOUND_INDEXERS", "[{")]));
        assert_err!(config(&[("TVHOUND_INDEXERS", "/nonexistent/indexers.json")]));
    }
}
