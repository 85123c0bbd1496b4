use std::path::PathBuf;

use thiserror::Error;

use crate::worker::WorkerState;

/// Result type alias for cache manager operations
pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Network unavailable: {0}")]
    Offline(String),

    #[error("Request for {url} failed with status {status}")]
    BadStatus { url: String, status: u16 },

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Storage error at {path}: {context}")]
    Storage {
        path: PathBuf,
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt cache data: {0}")]
    Corrupt(String),

    #[error("Offline fallback not cached: {0}")]
    FallbackMissing(String),

    #[error("Invalid lifecycle transition from {from} to {to}")]
    InvalidTransition { from: WorkerState, to: WorkerState },
}

/// Maximum length for URLs quoted in error messages
const MAX_ERROR_URL_LENGTH: usize = 200;

impl CacheError {
    /// Truncate a URL so query-heavy font URLs don't flood the logs
    fn truncate_url(url: &str) -> String {
        if url.len() <= MAX_ERROR_URL_LENGTH {
            url.to_string()
        } else {
            let mut end = MAX_ERROR_URL_LENGTH;
            while !url.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &url[..end], url.len())
        }
    }

    pub fn bad_status(url: &str, status: u16) -> Self {
        CacheError::BadStatus {
            url: Self::truncate_url(url),
            status,
        }
    }

    pub fn storage(path: impl Into<PathBuf>, context: impl Into<String>, source: std::io::Error) -> Self {
        CacheError::Storage {
            path: path.into(),
            context: context.into(),
            source,
        }
    }

    /// True when the error came from the transport rather than the cache.
    /// Only these failures trigger the offline substitutes.
    pub fn is_network_failure(&self) -> bool {
        matches!(self, CacheError::Http(_) | CacheError::Offline(_))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Corrupt(err.to_string())
    }
}
