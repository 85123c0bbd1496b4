use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::CacheResult;
use crate::http::Response;

use super::{CacheStorage, EntryInfo};

struct StoredEntry {
    response: Response,
    stored_at: DateTime<Utc>,
}

struct Bucket {
    name: String,
    entries: HashMap<String, StoredEntry>,
}

impl Bucket {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }
}

/// In-process bucket store. Writes to a bucket happen under one lock, so
/// `put_all` is atomic with respect to readers.
#[derive(Default)]
pub struct MemoryStorage {
    buckets: RwLock<Vec<Bucket>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn bucket_mut<'a>(buckets: &'a mut Vec<Bucket>, name: &str) -> &'a mut Bucket {
    match buckets.iter().position(|b| b.name == name) {
        Some(idx) => &mut buckets[idx],
        None => {
            buckets.push(Bucket::new(name));
            let last = buckets.len() - 1;
            &mut buckets[last]
        }
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, bucket: &str) -> CacheResult<()> {
        let mut buckets = self.buckets.write().await;
        bucket_mut(&mut buckets, bucket);
        Ok(())
    }

    async fn has(&self, bucket: &str) -> CacheResult<bool> {
        Ok(self.buckets.read().await.iter().any(|b| b.name == bucket))
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        Ok(self.buckets.read().await.iter().map(|b| b.name.clone()).collect())
    }

    async fn delete(&self, bucket: &str) -> CacheResult<bool> {
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        buckets.retain(|b| b.name != bucket);
        Ok(buckets.len() != before)
    }

    async fn match_entry(&self, bucket: &str, key: &str) -> CacheResult<Option<Response>> {
        let buckets = self.buckets.read().await;
        Ok(buckets
            .iter()
            .find(|b| b.name == bucket)
            .and_then(|b| b.entries.get(key))
            .map(|entry| entry.response.clone()))
    }

    async fn put_all(&self, bucket: &str, entries: Vec<(String, Response)>) -> CacheResult<()> {
        let stored_at = Utc::now();
        let mut buckets = self.buckets.write().await;
        let target = bucket_mut(&mut buckets, bucket);
        for (key, response) in entries {
            target.entries.insert(key, StoredEntry { response, stored_at });
        }
        Ok(())
    }

    async fn entries(&self, bucket: &str) -> CacheResult<Vec<EntryInfo>> {
        let buckets = self.buckets.read().await;
        let mut infos: Vec<EntryInfo> = buckets
            .iter()
            .find(|b| b.name == bucket)
            .map(|b| {
                b.entries
                    .iter()
                    .map(|(key, entry)| EntryInfo::describe(key, &entry.response, entry.stored_at))
                    .collect()
            })
            .unwrap_or_default();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(infos)
    }
}
