//! Named cache buckets.
//!
//! A bucket maps request keys to response snapshots. Buckets are created
//! implicitly on first open or write, listed in creation order, and deleted
//! wholesale. `put_all` commits a batch atomically: either every entry lands
//! or none does.
//!
//! Two implementations are provided:
//! - `MemoryStorage` for tests and short-lived hosts
//! - `DiskStorage` for the host harness, one directory per bucket

pub mod disk;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CacheResult;
use crate::http::Response;

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Create the bucket if it does not exist yet
    async fn open(&self, bucket: &str) -> CacheResult<()>;

    async fn has(&self, bucket: &str) -> CacheResult<bool>;

    /// Bucket names in creation order
    async fn keys(&self) -> CacheResult<Vec<String>>;

    /// Returns false when there was nothing to delete
    async fn delete(&self, bucket: &str) -> CacheResult<bool>;

    /// Look up an entry. A missing bucket is a miss, not an error.
    async fn match_entry(&self, bucket: &str, key: &str) -> CacheResult<Option<Response>>;

    /// Store every entry or none of them
    async fn put_all(&self, bucket: &str, entries: Vec<(String, Response)>) -> CacheResult<()>;

    async fn put(&self, bucket: &str, key: &str, response: Response) -> CacheResult<()> {
        self.put_all(bucket, vec![(key.to_string(), response)]).await
    }

    /// Summaries of every entry in the bucket, sorted by key
    async fn entries(&self, bucket: &str) -> CacheResult<Vec<EntryInfo>>;
}

/// Listing view of a cached entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub key: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub size: usize,
    pub stored_at: DateTime<Utc>,
}

impl EntryInfo {
    pub(crate) fn describe(key: &str, response: &Response, stored_at: DateTime<Utc>) -> Self {
        Self {
            key: key.to_string(),
            status: response.status,
            content_type: response.content_type().map(str::to_string),
            size: response.body.len(),
            stored_at,
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.stored_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}
