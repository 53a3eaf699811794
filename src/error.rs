//! Error taxonomy for feed ingestion and dispatch
//!
//! None of these are fatal: sweeps collect them into a list of [`Failure`]s and
//! always run to completion.

use thiserror::Error;

/// Failure to retrieve or read a feed envelope
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Malformed feed from {url}: {message}")]
    Envelope { url: String, message: String },
}

impl FetchError {
    /// Whether retrying the same request could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => {
                *status == 429 || *status == 408 || (500..600).contains(status)
            }
            FetchError::Envelope { .. } => false,
        }
    }
}

/// The release parser could not make sense of a title it recognised
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReleaseParseError {
    #[error("Episode numbers out of order in '{title}'")]
    EpisodeOrder { title: String },

    #[error("Invalid number '{value}' in '{title}'")]
    InvalidNumber { title: String, value: String },
}

/// The download client did not take the release
#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("Download client unreachable: {0}")]
    Transport(String),

    #[error("Download client rejected request: {0}")]
    Rejected(String),

    #[error("Download client did not accept '{0}'")]
    NotAccepted(String),
}

/// Any error raised while taking one feed item through the pipeline
#[derive(Error, Debug)]
#[error("Failed to process '{title}' from {indexer}: {source}")]
pub struct ItemProcessingError {
    pub indexer: String,
    pub title: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl ItemProcessingError {
    pub fn new(indexer: &str, title: &str, cause: anyhow::Error) -> Self {
        Self {
            indexer: indexer.to_string(),
            title: title.to_string(),
            source: cause.into(),
        }
    }
}

/// One collected failure from a sweep
#[derive(Error, Debug)]
pub enum Failure {
    #[error("Feed failure on {indexer}: {error}")]
    Fetch {
        indexer: String,
        #[source]
        error: FetchError,
    },

    #[error(transparent)]
    Item(#[from] ItemProcessingError),

    #[error("Submission of '{title}' failed: {error}")]
    Submission {
        title: String,
        #[source]
        error: SubmissionError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_statuses() {
        let status = |status| FetchError::Status {
            url: "http://indexer/rss".to_string(),
            status,
        };

        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(!status(404).is_transient());
        assert!(!FetchError::Envelope {
            url: "http://indexer/rss".to_string(),
            message: "eof".to_string(),
        }
        .is_transient());
    }

    #[test]
    fn test_item_error_message_names_release() {
        let err = ItemProcessingError::new("nzbs", "Show.S01E01", anyhow::anyhow!("boom"));
        assert_eq!(
            err.to_string(),
            "Failed to process 'Show.S01E01' from nzbs: boom"
        );
    }
}
