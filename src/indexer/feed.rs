//! RSS feed fetching and parsing
//!
//! Handles plain RSS 2.0 as well as Newznab-flavored feeds, which add an
//! `<enclosure>` for the NZB and `<newznab:attr name=".." value=".."/>` pairs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, info};

use super::{FeedItem, IndexerCredentials};
use crate::error::FetchError;
use crate::services::rate_limiter::{RateLimitedClient, RetryConfig, retry_async};

/// Retrieves and decodes one feed URL
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str, credentials: &IndexerCredentials) -> Result<Vec<FeedItem>, FetchError>;
}

/// Fetches feeds over HTTP with rate limiting and retries
#[derive(Clone)]
pub struct RssFeedFetcher {
    client: RateLimitedClient,
    retry: RetryConfig,
}

impl RssFeedFetcher {
    pub fn new(client: RateLimitedClient, retry: RetryConfig) -> Self {
        Self { client, retry }
    }

    pub(crate) async fn fetch_once(
        &self,
        url: &str,
        credentials: &IndexerCredentials,
    ) -> Result<String, FetchError> {
        let mut request = self.client.get(url).await;
        if let Some((user, pass)) = credentials.basic_auth() {
            request = request.basic_auth(user, Some(pass));
        }

        let response = request.send().await.map_err(|e| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response.text().await.map_err(|e| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// GET `url` with retries on transient failures, returning the body
    pub(crate) async fn fetch_body(
        &self,
        url: &str,
        credentials: &IndexerCredentials,
    ) -> Result<String, FetchError> {
        retry_async(
            move || self.fetch_once(url, credentials),
            FetchError::is_transient,
            &self.retry,
            "fetch_feed",
        )
        .await
    }
}

#[async_trait]
impl FeedFetcher for RssFeedFetcher {
    async fn fetch(&self, url: &str, credentials: &IndexerCredentials) -> Result<Vec<FeedItem>, FetchError> {
        info!(url = %url, "Fetching feed");
        let body = self.fetch_body(url, credentials).await?;
        parse_feed(url, &body)
    }
}

#[derive(Default)]
struct FeedItemBuilder {
    title: Option<String>,
    link: Option<String>,
    enclosure_url: Option<String>,
    description: Option<String>,
    guid: Option<String>,
    pub_date: Option<String>,
    attributes: HashMap<String, String>,
}

impl FeedItemBuilder {
    fn set_text(&mut self, tag: &str, text: String) {
        if text.is_empty() {
            return;
        }
        match tag {
            "title" => self.title = Some(text),
            "link" => self.link = Some(text),
            "guid" => self.guid = Some(text),
            "pubDate" => self.pub_date = Some(text),
            "description" => self.description = Some(text),
            _ => {}
        }
    }

    fn read_element(&mut self, e: &BytesStart<'_>) {
        let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
        match tag.as_str() {
            "enclosure" => {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"url" {
                        self.enclosure_url = Some(String::from_utf8_lossy(&attr.value).to_string());
                    }
                }
            }
            "newznab:attr" | "torznab:attr" => {
                let mut name = None;
                let mut value = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"name" => name = Some(String::from_utf8_lossy(&attr.value).to_string()),
                        b"value" => value = Some(String::from_utf8_lossy(&attr.value).to_string()),
                        _ => {}
                    }
                }
                if let (Some(name), Some(value)) = (name, value) {
                    self.attributes.insert(name, value);
                }
            }
            _ => {}
        }
    }

    /// Items without a title or any download link are dropped
    fn build(self) -> Option<FeedItem> {
        let title = self.title?;
        let link = self.link.or_else(|| self.enclosure_url.clone())?;

        Some(FeedItem {
            title,
            link,
            enclosure_url: self.enclosure_url,
            description: self.description,
            guid: self.guid,
            published_at: self.pub_date.as_deref().and_then(parse_rss_date),
            attributes: self.attributes,
        })
    }
}

/// Parse an RSS envelope into feed items
///
/// A malformed document is an envelope error for the whole feed; individual
/// items missing a title or link are skipped.
pub fn parse_feed(url: &str, content: &str) -> Result<Vec<FeedItem>, FetchError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut current: Option<FeedItemBuilder> = None;
    let mut current_tag = String::new();
    let mut saw_channel = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match tag.as_str() {
                    "channel" | "feed" => saw_channel = true,
                    "item" => current = Some(FeedItemBuilder::default()),
                    _ => {
                        if let Some(builder) = current.as_mut() {
                            builder.read_element(e);
                        }
                    }
                }
                current_tag = tag;
            }
            Ok(Event::Empty(ref e)) => {
                if let Some(builder) = current.as_mut() {
                    builder.read_element(e);
                }
            }
            Ok(Event::Text(ref e)) => {
                if let Some(builder) = current.as_mut() {
                    let text = e.unescape().map(|t| t.trim().to_string()).unwrap_or_default();
                    builder.set_text(&current_tag, text);
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(builder) = current.as_mut() {
                    let text = String::from_utf8_lossy(e).trim().to_string();
                    builder.set_text(&current_tag, text);
                }
            }
            Ok(Event::End(ref e)) => {
                if e.name().as_ref() == b"item" {
                    if let Some(item) = current.take().and_then(FeedItemBuilder::build) {
                        items.push(item);
                    }
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FetchError::Envelope {
                    url: url.to_string(),
                    message: e.to_string(),
                });
            }
            _ => {}
        }
    }

    if !saw_channel {
        return Err(FetchError::Envelope {
            url: url.to_string(),
            message: "document has no RSS channel".to_string(),
        });
    }

    debug!(url = %url, items = items.len(), "Parsed feed");
    Ok(items)
}

/// RFC 2822 with a few common fallbacks
fn parse_rss_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }

    debug!("Failed to parse RSS date: {}", s);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    const URL: &str = "http://indexer/rss";

    #[test]
    fn test_parse_plain_rss() {
        let content = r#"
        <rss version="2.0">
        <channel>
            <title>Test Feed</title>
            <item>
                <title>Chicago Fire S14E08 720p HDTV x264-ETHEL</title>
                <link>https://example.com/nzb/12345</link>
                <pubDate>Thu, 08 Jan 2026 10:01:59 +0000</pubDate>
                <description><![CDATA[1.48 GB; TV/HD]]></description>
            </item>
            <item>
                <title>Corner Gas S06E12 1080p WEB-DL-QOQ</title>
                <link>https://example.com/nzb/67890</link>
            </item>
            <item>
                <link>https://example.com/nzb/no-title</link>
            </item>
        </channel>
        </rss>
        "#;

        let items = parse_feed(URL, content).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "Chicago Fire S14E08 720p HDTV x264-ETHEL");
        assert_eq!(items[0].link, "https://example.com/nzb/12345");
        assert_eq!(items[0].description.as_deref(), Some("1.48 GB; TV/HD"));
        assert!(items[0].published_at.is_some());
        assert_eq!(items[1].published_at, None);
    }

    #[test]
    fn test_parse_newznab_attributes() {
        let content = r#"<?xml version="1.0" encoding="UTF-8"?>
        <rss version="2.0" xmlns:newznab="http://www.newznab.com/DTD/2010/feeds/attributes/">
        <channel>
            <item>
                <title>Fringe.S02E03.720p.HDTV.x264-CTU</title>
                <guid>abc123</guid>
                <link>https://api.indexer/details/abc123</link>
                <enclosure url="https://api.indexer/getnzb/abc123.nzb" length="1000" type="application/x-nzb"/>
                <newznab:attr name="season" value="S02"/>
                <newznab:attr name="size" value="1000"/>
            </item>
        </channel>
        </rss>"#;

        let items = parse_feed(URL, content).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].enclosure_url.as_deref(), Some("https://api.indexer/getnzb/abc123.nzb"));
        assert_eq!(items[0].guid.as_deref(), Some("abc123"));
        assert_eq!(items[0].attributes.get("size").map(String::as_str), Some("1000"));
    }

    #[test]
    fn test_not_a_feed_is_envelope_error() {
        let result = parse_feed(URL, "<html><body>Login required</body></html>");
        assert_matches!(result, Err(FetchError::Envelope { .. }));
    }

    #[test]
    fn test_broken_xml_is_envelope_error() {
        let result = parse_feed(URL, "<rss><channel><item><title>x</item></channel></rss>");
        assert_matches!(result, Err(FetchError::Envelope { .. }));
    }
}
