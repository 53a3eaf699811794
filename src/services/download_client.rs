//! Download client integration
//!
//! The pipeline hands accepted releases to a [`DownloadClient`]. The shipped
//! implementation talks to SABnzbd's HTTP API:
//! - `mode=addurl` (or `mode=addid` for Newzbin report ids) to submit
//! - `mode=queue&output=xml` to check what is already queued
//! - `mode=get_cats&output=json` to list categories

use async_trait::async_trait;
use once_cell::sync::Lazy;
use quick_xml::Reader;
use quick_xml::events::Event;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::db::EpisodeRecord;
use crate::error::SubmissionError;
use crate::services::rate_limiter::RateLimitedClient;
use crate::services::release_parser::ReleaseDescriptor;

/// Something that downloads NZBs
#[async_trait]
pub trait DownloadClient: Send + Sync {
    /// Hand over `url` to be downloaded under `title`
    async fn submit(&self, url: &str, title: &str) -> Result<(), SubmissionError>;

    /// Whether a job named `title` is already queued
    async fn is_in_queue(&self, title: &str) -> Result<bool, SubmissionError>;
}

/// Name a release is queued under
///
/// "Series - 1x2-1x3 - Episode Title [HDTV] [Proper]" for episodes and
/// "Series - Season 1 [HDTV] [Proper]" for full seasons. The episode title is
/// taken from the first resolved episode; an untitled episode leaves it blank.
pub fn download_title(series_title: &str, descriptor: &ReleaseDescriptor, episodes: &[EpisodeRecord]) -> String {
    let proper = if descriptor.is_proper() { " [Proper]" } else { "" };
    let tier = descriptor.quality.tier;

    if descriptor.is_full_season {
        return format!(
            "{} - Season {} [{}]{}",
            series_title, descriptor.season_number, tier, proper
        );
    }

    let numbers = descriptor
        .episode_numbers
        .iter()
        .map(|e| format!("{}x{}", descriptor.season_number, e))
        .collect::<Vec<_>>()
        .join("-");
    let episode_title = episodes
        .first()
        .and_then(|e| e.title.as_deref())
        .unwrap_or_default();

    format!("{} - {} - {} [{}]{}", series_title, numbers, episode_title, tier, proper)
}

static NEWZBIN_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)newzbin\.com/browse/post/(\d+)").expect("valid regex"));

/// SABnzbd job priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SabPriority {
    Low,
    #[default]
    Normal,
    High,
    Force,
}

impl SabPriority {
    pub fn as_api_value(&self) -> i32 {
        match self {
            SabPriority::Low => -1,
            SabPriority::Normal => 0,
            SabPriority::High => 1,
            SabPriority::Force => 2,
        }
    }
}

impl std::str::FromStr for SabPriority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" | "-1" => Ok(SabPriority::Low),
            "normal" | "0" => Ok(SabPriority::Normal),
            "high" | "1" => Ok(SabPriority::High),
            "force" | "2" => Ok(SabPriority::Force),
            _ => Err(anyhow::anyhow!("Unknown SABnzbd priority: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SabnzbdConfig {
    pub host: String,
    pub port: u16,
    pub api_key: String,
    pub username: String,
    pub password: String,
    pub category: String,
    pub priority: SabPriority,
}

#[derive(Debug, Deserialize)]
struct CategoriesResponse {
    #[serde(default)]
    categories: Vec<String>,
}

pub struct SabnzbdClient {
    config: SabnzbdConfig,
    http: RateLimitedClient,
}

impl SabnzbdClient {
    pub fn new(config: SabnzbdConfig, http: RateLimitedClient) -> Self {
        Self { config, http }
    }

    fn api_url(&self, mode: &str, params: &[(&str, String)]) -> String {
        let base = format!("http://{}:{}/api", self.config.host, self.config.port);
        let mut url = match Url::parse(&base) {
            Ok(url) => url,
            Err(_) => return base,
        };
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("mode", mode);
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
            pairs
                .append_pair("apikey", &self.config.api_key)
                .append_pair("ma_username", &self.config.username)
                .append_pair("ma_password", &self.config.password);
        }
        url.to_string()
    }

    /// URL for submitting `nzb_url` as `title`
    pub fn submit_url(&self, nzb_url: &str, title: &str) -> String {
        let (mode, name) = match NEWZBIN_ID_RE.captures(nzb_url) {
            Some(caps) => ("addid", caps[1].to_string()),
            None => ("addurl", nzb_url.to_string()),
        };

        self.api_url(
            mode,
            &[
                ("name", name),
                ("priority", self.config.priority.as_api_value().to_string()),
                ("pp", "3".to_string()),
                ("cat", self.config.category.clone()),
                ("nzbname", title.to_string()),
            ],
        )
    }

    pub fn queue_url(&self) -> String {
        self.api_url("queue", &[("output", "xml".to_string())])
    }

    async fn call(&self, url: &str) -> Result<String, SubmissionError> {
        let response = self
            .http
            .get(url)
            .await
            .send()
            .await
            .map_err(|e| SubmissionError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SubmissionError::Transport(format!("HTTP {}", response.status())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SubmissionError::Transport(e.to_string()))?;

        check_api_error(&body)?;
        Ok(body)
    }

    /// Categories configured in SABnzbd, without the "*" default
    pub async fn categories(&self) -> Result<Vec<String>, SubmissionError> {
        let body = self
            .call(&self.api_url("get_cats", &[("output", "json".to_string())]))
            .await?;
        parse_categories(&body)
    }
}

#[async_trait]
impl DownloadClient for SabnzbdClient {
    async fn submit(&self, url: &str, title: &str) -> Result<(), SubmissionError> {
        let body = self.call(&self.submit_url(url, title)).await?;

        if body.trim().eq_ignore_ascii_case("ok") {
            info!(title = %title, "Queued release in SABnzbd");
            return Ok(());
        }

        warn!(title = %title, response = %body.trim(), "SABnzbd did not accept release");
        Err(SubmissionError::NotAccepted(title.to_string()))
    }

    async fn is_in_queue(&self, title: &str) -> Result<bool, SubmissionError> {
        let body = self.call(&self.queue_url()).await?;
        let queued = parse_queue_filenames(&body)?;
        let found = queued.iter().any(|name| name.eq_ignore_ascii_case(title));
        debug!(title = %title, queued = queued.len(), found = found, "Checked SABnzbd queue");
        Ok(found)
    }
}

/// SABnzbd reports API failures as a 200 with an "error: ..." body
fn check_api_error(body: &str) -> Result<(), SubmissionError> {
    let trimmed = body.trim();
    if let Some(message) = trimmed.strip_prefix("error:") {
        return Err(SubmissionError::Rejected(message.trim().to_string()));
    }
    if trimmed.eq_ignore_ascii_case("error") {
        return Err(SubmissionError::Rejected("error".to_string()));
    }
    Ok(())
}

/// Names of the jobs in a `mode=queue&output=xml` response
///
/// An `<error>` element (for example a wrong API key) is a rejection.
fn parse_queue_filenames(xml: &str) -> Result<Vec<String>, SubmissionError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut names = Vec::new();
    let mut api_error: Option<String> = None;
    let mut in_slot = false;
    let mut in_filename = false;
    let mut in_error = false;

    loop {
        let text = match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                match e.name().as_ref() {
                    b"slot" => in_slot = true,
                    b"filename" => in_filename = in_slot,
                    b"error" => {
                        in_error = true;
                        api_error.get_or_insert_with(String::new);
                    }
                    _ => {}
                }
                continue;
            }
            Ok(Event::End(ref e)) => {
                match e.name().as_ref() {
                    b"slot" => in_slot = false,
                    b"filename" => in_filename = false,
                    b"error" => in_error = false,
                    _ => {}
                }
                continue;
            }
            Ok(Event::Text(ref e)) if in_filename || in_error => e
                .unescape()
                .map_err(|e| SubmissionError::Rejected(format!("Malformed queue response: {}", e)))?
                .trim()
                .to_string(),
            Ok(Event::CData(ref e)) if in_filename || in_error => String::from_utf8_lossy(e).trim().to_string(),
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"error" => {
                api_error.get_or_insert_with(String::new);
                continue;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SubmissionError::Rejected(format!("Malformed queue response: {}", e)));
            }
            _ => continue,
        };

        match api_error.as_mut() {
            Some(message) if in_error => message.push_str(&text),
            _ => names.push(text),
        }
    }

    if let Some(message) = api_error {
        if message.is_empty() {
            return Err(SubmissionError::Rejected("unknown error".to_string()));
        }
        return Err(SubmissionError::Rejected(message));
    }

    Ok(names)
}

fn parse_categories(body: &str) -> Result<Vec<String>, SubmissionError> {
    let response: CategoriesResponse = serde_json::from_str(body)
        .map_err(|e| SubmissionError::Rejected(format!("Malformed categories response: {}", e)))?;
    Ok(response
        .categories
        .into_iter()
        .filter(|c| c != "*")
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::{Quality, QualityTier};
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn client() -> SabnzbdClient {
        SabnzbdClient::new(
            SabnzbdConfig {
                host: "192.168.5.55".to_string(),
                port: 2222,
                api_key: "5c770e3197e4fe763423ee7c392c25d1".to_string(),
                username: "admin".to_string(),
                password: "pass".to_string(),
                category: "tv".to_string(),
                priority: SabPriority::Normal,
            },
            RateLimitedClient::for_download_client(Duration::from_secs(5)).unwrap(),
        )
    }

    fn descriptor(episodes: Vec<i32>, tier: QualityTier, proper: bool, full: bool) -> ReleaseDescriptor {
        ReleaseDescriptor {
            raw_title: "raw".to_string(),
            series_title: "my series name".to_string(),
            matched_series_id: Some(1),
            season_number: 1,
            episode_numbers: episodes,
            quality: Quality::new(tier, proper),
            is_full_season: full,
        }
    }

    fn titled(title: &str) -> Vec<EpisodeRecord> {
        let mut episode = EpisodeRecord::missing(1, 1, 1, 2);
        episode.title = Some(title.to_string());
        vec![episode]
    }

    // =========================================================================
    // Download titles
    // =========================================================================

    #[test]
    fn test_download_title_single_episode() {
        let d = descriptor(vec![2], QualityTier::Dvd, false, false);
        assert_eq!(
            download_title("My Series Name", &d, &titled("My Episode Title")),
            "My Series Name - 1x2 - My Episode Title [DVD]"
        );
    }

    #[test]
    fn test_download_title_proper_and_blank_title() {
        let d = descriptor(vec![2], QualityTier::Dvd, true, false);
        assert_eq!(
            download_title("My Series Name", &d, &titled("My Episode Title")),
            "My Series Name - 1x2 - My Episode Title [DVD] [Proper]"
        );
        assert_eq!(
            download_title("My Series Name", &d, &[EpisodeRecord::missing(1, 1, 1, 2)]),
            "My Series Name - 1x2 -  [DVD] [Proper]"
        );
    }

    #[test]
    fn test_download_title_multi_episode() {
        let d = descriptor(vec![2, 4], QualityTier::Hdtv, false, false);
        assert_eq!(
            download_title("My Series Name", &d, &titled("My Episode Title")),
            "My Series Name - 1x2-1x4 - My Episode Title [HDTV]"
        );
    }

    #[test]
    fn test_download_title_full_season() {
        let d = descriptor(vec![], QualityTier::Bluray720p, true, true);
        assert_eq!(
            download_title("My Series Name", &d, &titled("My Episode Title")),
            "My Series Name - Season 1 [Bluray720p] [Proper]"
        );
        let d = descriptor(vec![], QualityTier::Bluray720p, false, true);
        assert_eq!(
            download_title("My Series Name", &d, &[]),
            "My Series Name - Season 1 [Bluray720p]"
        );
    }

    // =========================================================================
    // API requests
    // =========================================================================

    #[test]
    fn test_submit_url() {
        assert_eq!(
            client().submit_url("http://www.nzbclub.com/nzb_download.aspx?mid=1950232", "This is an Nzb"),
            "http://192.168.5.55:2222/api?mode=addurl\
             &name=http%3A%2F%2Fwww.nzbclub.com%2Fnzb_download.aspx%3Fmid%3D1950232\
             &priority=0&pp=3&cat=tv&nzbname=This+is+an+Nzb\
             &apikey=5c770e3197e4fe763423ee7c392c25d1&ma_username=admin&ma_password=pass"
        );
    }

    #[test]
    fn test_submit_url_newzbin_uses_report_id() {
        let url = client().submit_url("http://www.newzbin.com/browse/post/6107863/nzb", "This is an Nzb");
        assert!(url.starts_with("http://192.168.5.55:2222/api?mode=addid&name=6107863&priority=0"));
    }

    #[test]
    fn test_queue_url() {
        assert_eq!(
            client().queue_url(),
            "http://192.168.5.55:2222/api?mode=queue&output=xml\
             &apikey=5c770e3197e4fe763423ee7c392c25d1&ma_username=admin&ma_password=pass"
        );
    }

    // =========================================================================
    // Response parsing
    // =========================================================================

    #[test]
    fn test_parse_queue() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" ?>
        <queue>
            <paused>False</paused>
            <slots>
                <slot>
                    <status>Downloading</status>
                    <filename><![CDATA[Ubuntu Test]]></filename>
                </slot>
                <slot>
                    <filename>My Series Name - 1x2 - Pilot [HDTV]</filename>
                </slot>
            </slots>
        </queue>"#;

        assert_eq!(
            parse_queue_filenames(xml).unwrap(),
            vec!["Ubuntu Test".to_string(), "My Series Name - 1x2 - Pilot [HDTV]".to_string()]
        );
        assert!(parse_queue_filenames("<queue><slots></slots></queue>").unwrap().is_empty());
    }

    #[test]
    fn test_queue_error_reply_is_rejection() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" ?>
        <result>
            <status>False</status>
            <error>API Key Incorrect</error>
        </result>"#;

        assert!(check_api_error(xml).is_ok());
        assert_matches!(
            parse_queue_filenames(xml),
            Err(SubmissionError::Rejected(msg)) if msg == "API Key Incorrect"
        );
        assert_matches!(
            parse_queue_filenames("<result><error/></result>"),
            Err(SubmissionError::Rejected(_))
        );
    }

    #[test]
    fn test_api_error_body() {
        assert_matches!(
            check_api_error("error: API Key Incorrect\n"),
            Err(SubmissionError::Rejected(msg)) if msg == "API Key Incorrect"
        );
        assert!(check_api_error("ok\n").is_ok());
    }

    #[test]
    fn test_parse_categories_drops_default() {
        let cats = parse_categories(r#"{"categories":["*","tv","movies"]}"#).unwrap();
        assert_eq!(cats, vec!["tv".to_string(), "movies".to_string()]);
    }
}
