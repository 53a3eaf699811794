//! Active searches against Newznab indexers
//!
//! Used by the search queue to turn a backlog command into feed items. The
//! response of `t=tvsearch` is an ordinary Newznab RSS document.

use async_trait::async_trait;
use tracing::{debug, info};
use url::Url;

use super::{FeedItem, IndexerDefinition, RssFeedFetcher, parse_feed};
use crate::error::FetchError;

/// What to look for; built from a search command and its series
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub series_title: String,
    pub season_number: i32,
    /// `None` searches for the whole season
    pub episode_number: Option<i32>,
}

#[async_trait]
pub trait ReleaseSearcher: Send + Sync {
    async fn search(&self, indexer: &IndexerDefinition, query: &SearchQuery) -> Result<Vec<FeedItem>, FetchError>;
}

/// `t=tvsearch` over the Newznab API
#[derive(Clone)]
pub struct NewznabSearcher {
    fetcher: RssFeedFetcher,
}

impl NewznabSearcher {
    pub fn new(fetcher: RssFeedFetcher) -> Self {
        Self { fetcher }
    }

    /// Build the search URL, or `None` when the indexer is not searchable
    pub fn build_url(indexer: &IndexerDefinition, query: &SearchQuery) -> Option<String> {
        let api_url = indexer.api_url.as_deref()?;
        let api_key = indexer.credentials.api_key.as_deref()?;

        let mut url = Url::parse(&format!("{}/api", api_url.trim_end_matches('/'))).ok()?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("t", "tvsearch")
                .append_pair("apikey", api_key)
                .append_pair("q", &query.series_title)
                .append_pair("season", &query.season_number.to_string());
            if let Some(episode) = query.episode_number {
                pairs.append_pair("ep", &episode.to_string());
            }
        }
        Some(url.to_string())
    }
}

#[async_trait]
impl ReleaseSearcher for NewznabSearcher {
    async fn search(&self, indexer: &IndexerDefinition, query: &SearchQuery) -> Result<Vec<FeedItem>, FetchError> {
        let Some(url) = Self::build_url(indexer, query) else {
            debug!(indexer = %indexer.name, "Indexer has no search API configured");
            return Ok(Vec::new());
        };

        info!(
            indexer = %indexer.name,
            series = %query.series_title,
            season = query.season_number,
            episode = ?query.episode_number,
            "Searching indexer"
        );

        let body = self.fetcher.fetch_body(&url, &indexer.credentials).await?;
        parse_feed(&url, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::IndexerKind;

    fn indexer() -> IndexerDefinition {
        let mut def = IndexerDefinition::new("geek", vec![], IndexerKind::Newznab);
        def.api_url = Some("https://api.nzbgeek.info/".to_string());
        def.credentials.api_key = Some("k3y".to_string());
        def
    }

    #[test]
    fn test_episode_search_url() {
        let query = SearchQuery {
            series_title: "The Office (US)".to_string(),
            season_number: 3,
            episode_number: Some(5),
        };

        let url = NewznabSearcher::build_url(&indexer(), &query).unwrap();
        assert_eq!(
            url,
            "https://api.nzbgeek.info/api?t=tvsearch&apikey=k3y&q=The+Office+%28US%29&season=3&ep=5"
        );
    }

    #[test]
    fn test_season_search_url_has_no_episode() {
        let query = SearchQuery {
            series_title: "Fringe".to_string(),
            season_number: 2,
            episode_number: None,
        };

        let url = NewznabSearcher::build_url(&indexer(), &query).unwrap();
        assert!(url.ends_with("q=Fringe&season=2"));
    }

    #[test]
    fn test_unsearchable_indexer() {
        let mut def = indexer();
        def.credentials.api_key = None;
        let query = SearchQuery {
            series_title: "Fringe".to_string(),
            season_number: 2,
            episode_number: None,
        };
        assert_eq!(NewznabSearcher::build_url(&def, &query), None);
    }
}
