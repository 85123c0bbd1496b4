//! On-disk bucket store.
//!
//! Layout under the root directory:
//!
//! ```text
//! buckets.json              ordered list of {name, dir}
//! <dir>/index.json          request key -> entry metadata
//! <dir>/blobs/<sha256>      response bodies, content addressed
//! ```
//!
//! Index files and blobs are written to a temp file and renamed into place,
//! so readers see either the previous or the new content. Blobs are written
//! before the index that references them, and blobs no longer referenced
//! are removed once the new index is committed.

use std::collections::{BTreeMap, HashSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{CacheError, CacheResult};
use crate::http::{Headers, Response, ResponseType};

use super::{CacheStorage, EntryInfo};

/// Bucket registry file name in the storage root
const BUCKETS_FILE: &str = "buckets.json";

/// Per-bucket index file name
const INDEX_FILE: &str = "index.json";

const BLOBS_DIR: &str = "blobs";

/// Hex characters of the name digest used for bucket directory names.
/// Bucket names are arbitrary strings, so they never appear in paths.
const BUCKET_DIR_LEN: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BucketRecord {
    name: String,
    dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryRecord {
    status: u16,
    response_type: ResponseType,
    headers: Headers,
    digest: String,
    size: usize,
    stored_at: DateTime<Utc>,
}

type Index = BTreeMap<String, EntryRecord>;

pub struct DiskStorage {
    root: PathBuf,
    /// Serialises read-modify-write cycles on the registry and indexes.
    /// Body reads take it too, since commits collect unreferenced blobs.
    write_lock: Mutex<()>,
}

impl DiskStorage {
    pub async fn new(root: PathBuf) -> CacheResult<Self> {
        fs::create_dir_all(&root)
            .await
            .map_err(|e| CacheError::storage(&root, "Failed to create cache directory", e))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn buckets_path(&self) -> PathBuf {
        self.root.join(BUCKETS_FILE)
    }

    fn bucket_dir(&self, record: &BucketRecord) -> PathBuf {
        self.root.join(&record.dir)
    }

    fn dir_name(bucket: &str) -> String {
        let digest = hex::encode(Sha256::digest(bucket.as_bytes()));
        digest[..BUCKET_DIR_LEN].to_string()
    }

    async fn load_buckets(&self) -> CacheResult<Vec<BucketRecord>> {
        Ok(read_json(&self.buckets_path()).await?.unwrap_or_default())
    }

    async fn find_bucket(&self, bucket: &str) -> CacheResult<Option<BucketRecord>> {
        Ok(self.load_buckets().await?.into_iter().find(|r| r.name == bucket))
    }

    async fn load_index(&self, record: &BucketRecord) -> CacheResult<Index> {
        Ok(read_json(&self.bucket_dir(record).join(INDEX_FILE)).await?.unwrap_or_default())
    }

    /// Register the bucket if absent. Caller holds the write lock.
    async fn ensure_bucket(&self, bucket: &str) -> CacheResult<BucketRecord> {
        let mut records = self.load_buckets().await?;
        if let Some(existing) = records.iter().find(|r| r.name == bucket) {
            return Ok(existing.clone());
        }

        let record = BucketRecord {
            name: bucket.to_string(),
            dir: Self::dir_name(bucket),
        };

        // Files left behind by an earlier bucket of the same name are not ours
        let dir = self.bucket_dir(&record);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => warn!(bucket = bucket, path = %dir.display(), "Cleared leftover bucket directory"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::storage(&dir, "Failed to clear leftover bucket directory", e)),
        }

        let blobs = dir.join(BLOBS_DIR);
        fs::create_dir_all(&blobs)
            .await
            .map_err(|e| CacheError::storage(&blobs, "Failed to create bucket directory", e))?;

        records.push(record.clone());
        write_json_atomic(&self.buckets_path(), &records).await?;
        debug!(bucket = bucket, dir = %record.dir, "Created bucket");
        Ok(record)
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn open(&self, bucket: &str) -> CacheResult<()> {
        let _guard = self.write_lock.lock().await;
        self.ensure_bucket(bucket).await?;
        Ok(())
    }

    async fn has(&self, bucket: &str) -> CacheResult<bool> {
        Ok(self.find_bucket(bucket).await?.is_some())
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        Ok(self.load_buckets().await?.into_iter().map(|r| r.name).collect())
    }

    async fn delete(&self, bucket: &str) -> CacheResult<bool> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load_buckets().await?;
        let Some(pos) = records.iter().position(|r| r.name == bucket) else {
            return Ok(false);
        };
        let record = records.remove(pos);
        write_json_atomic(&self.buckets_path(), &records).await?;

        // The bucket is gone once unregistered. Leftover files are cleared
        // if a bucket of the same name is created again.
        let dir = self.bucket_dir(&record);
        if let Err(e) = fs::remove_dir_all(&dir).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(bucket = bucket, path = %dir.display(), error = %e, "Failed to remove bucket directory");
            }
        }
        Ok(true)
    }

    async fn match_entry(&self, bucket: &str, key: &str) -> CacheResult<Option<Response>> {
        let _guard = self.write_lock.lock().await;
        let Some(record) = self.find_bucket(bucket).await? else {
            return Ok(None);
        };
        let index = self.load_index(&record).await?;
        let Some(entry) = index.get(key) else {
            return Ok(None);
        };

        let blob_path = self.bucket_dir(&record).join(BLOBS_DIR).join(&entry.digest);
        let body = fs::read(&blob_path).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                CacheError::Corrupt(format!("missing body for {} in bucket {}", key, bucket))
            } else {
                CacheError::storage(&blob_path, "Failed to read cached body", e)
            }
        })?;

        Ok(Some(Response {
            status: entry.status,
            response_type: entry.response_type,
            headers: entry.headers.clone(),
            body: Bytes::from(body),
        }))
    }

    async fn put_all(&self, bucket: &str, entries: Vec<(String, Response)>) -> CacheResult<()> {
        let _guard = self.write_lock.lock().await;
        let record = self.ensure_bucket(bucket).await?;
        let blobs = self.bucket_dir(&record).join(BLOBS_DIR);
        let stored_at = Utc::now();

        let mut index = self.load_index(&record).await?;
        for (key, response) in entries {
            let digest = hex::encode(Sha256::digest(&response.body));
            write_blob(&blobs.join(&digest), &response.body).await?;
            index.insert(
                key,
                EntryRecord {
                    status: response.status,
                    response_type: response.response_type,
                    headers: response.headers,
                    digest,
                    size: response.body.len(),
                    stored_at,
                },
            );
        }

        // Single commit point for the whole batch
        write_json_atomic(&self.bucket_dir(&record).join(INDEX_FILE), &index).await?;
        collect_blobs(&blobs, &index).await;
        Ok(())
    }

    async fn entries(&self, bucket: &str) -> CacheResult<Vec<EntryInfo>> {
        let Some(record) = self.find_bucket(bucket).await? else {
            return Ok(Vec::new());
        };
        let index = self.load_index(&record).await?;
        // BTreeMap iteration is already sorted by key
        Ok(index
            .into_iter()
            .map(|(key, entry)| EntryInfo {
                key,
                status: entry.status,
                content_type: entry.headers.get("content-type").map(str::to_string),
                size: entry.size,
                stored_at: entry.stored_at,
            })
            .collect())
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> CacheResult<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(contents) => {
            let value = serde_json::from_str(&contents)
                .map_err(|e| CacheError::Corrupt(format!("{}: {}", path.display(), e)))?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CacheError::storage(path, "Failed to read cache metadata", e)),
    }
}

/// Content-addressed, so an existing blob is already complete
async fn write_blob(path: &Path, body: &[u8]) -> CacheResult<()> {
    if fs::metadata(path).await.is_ok() {
        return Ok(());
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, body)
        .await
        .map_err(|e| CacheError::storage(&tmp, "Failed to write cached body", e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| CacheError::storage(path, "Failed to commit cached body", e))
}

/// Remove blobs the committed index no longer references, including temp
/// files from interrupted writes. Caller holds the write lock.
async fn collect_blobs(blobs: &Path, index: &Index) {
    let live: HashSet<&str> = index.values().map(|entry| entry.digest.as_str()).collect();
    let mut dir = match fs::read_dir(blobs).await {
        Ok(dir) => dir,
        Err(e) => {
            warn!(path = %blobs.display(), error = %e, "Failed to list blobs");
            return;
        }
    };

    let mut removed = 0usize;
    loop {
        let entry = match dir.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!(path = %blobs.display(), error = %e, "Failed to list blobs");
                break;
            }
        };
        let name = entry.file_name();
        if live.contains(name.to_string_lossy().as_ref()) {
            continue;
        }
        match fs::remove_file(entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %entry.path().display(), error = %e, "Failed to remove unreferenced blob"),
        }
    }
    if removed > 0 {
        debug!(path = %blobs.display(), removed = removed, "Collected unreferenced blobs");
    }
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> CacheResult<()> {
    let contents = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)
        .await
        .map_err(|e| CacheError::storage(&tmp, "Failed to write cache metadata", e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| CacheError::storage(path, "Failed to commit cache metadata", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn css() -> Response {
        Response::ok("body { margin: 0 }").with_header("Content-Type", "text/css")
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = DiskStorage::new(dir.path().to_path_buf()).await.unwrap();
            storage.put("rybuhome-v1", "GET https://rybuhome.com/style.css", css()).await.unwrap();
        }

        let storage = DiskStorage::new(dir.path().to_path_buf()).await.unwrap();
        let hit = storage
            .match_entry("rybuhome-v1", "GET https://rybuhome.com/style.css")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit, css());
        assert_eq!(storage.keys().await.unwrap(), vec!["rybuhome-v1"]);
    }

    #[tokio::test]
    async fn test_delete_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).await.unwrap();
        storage.put("old", "GET https://rybuhome.com/", Response::ok("x")).await.unwrap();
        let bucket_dir = dir.path().join(DiskStorage::dir_name("old"));
        assert!(bucket_dir.exists());

        assert!(storage.delete("old").await.unwrap());
        assert!(!bucket_dir.exists());
        assert!(storage.keys().await.unwrap().is_empty());
        assert!(!storage.delete("old").await.unwrap());
    }

    #[tokio::test]
    async fn test_identical_bodies_share_a_blob() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).await.unwrap();
        storage
            .put_all(
                "v1",
                vec![
                    ("GET https://rybuhome.com/".to_string(), Response::ok("<html>")),
                    ("GET https://rybuhome.com/index.html".to_string(), Response::ok("<html>")),
                ],
            )
            .await
            .unwrap();

        let blobs = dir.path().join(DiskStorage::dir_name("v1")).join(BLOBS_DIR);
        assert_eq!(std::fs::read_dir(blobs).unwrap().count(), 1);
        assert_eq!(storage.entries("v1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_index_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).await.unwrap();
        storage.open("v1").await.unwrap();
        let index = dir.path().join(DiskStorage::dir_name("v1")).join(INDEX_FILE);
        std::fs::write(index, "{not json").unwrap();

        let err = storage.match_entry("v1", "GET https://rybuhome.com/").await.unwrap_err();
        assert!(matches!(err, CacheError::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_failed_blob_write_leaves_index_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).await.unwrap();
        storage.put("v1", "GET https://rybuhome.com/", Response::ok("<html>")).await.unwrap();
        let index_path = dir.path().join(DiskStorage::dir_name("v1")).join(INDEX_FILE);
        let index_before = std::fs::read(&index_path).unwrap();

        // A directory squatting on the temp path makes the second body unwritable
        let blocked = hex::encode(Sha256::digest(b"p { color: red }"));
        let blobs = dir.path().join(DiskStorage::dir_name("v1")).join(BLOBS_DIR);
        std::fs::create_dir(blobs.join(format!("{}.tmp", blocked))).unwrap();

        let err = storage
            .put_all(
                "v1",
                vec![
                    ("GET https://rybuhome.com/app.js".to_string(), Response::ok("console.log(1)")),
                    ("GET https://rybuhome.com/style.css".to_string(), Response::ok("p { color: red }")),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Storage { .. }));

        assert_eq!(std::fs::read(&index_path).unwrap(), index_before);
        let keys: Vec<String> = storage.entries("v1").await.unwrap().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["GET https://rybuhome.com/"]);
        assert!(storage
            .match_entry("v1", "GET https://rybuhome.com/app.js")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_recreated_bucket_does_not_inherit_leftover_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).await.unwrap();
        storage.put("v1", "GET https://rybuhome.com/", Response::ok("stale")).await.unwrap();
        let bucket_dir = dir.path().join(DiskStorage::dir_name("v1"));
        let index = std::fs::read(bucket_dir.join(INDEX_FILE)).unwrap();
        let blob = hex::encode(Sha256::digest(b"stale"));

        // Deleted, but its files stayed behind
        assert!(storage.delete("v1").await.unwrap());
        std::fs::create_dir_all(bucket_dir.join(BLOBS_DIR)).unwrap();
        std::fs::write(bucket_dir.join(INDEX_FILE), index).unwrap();
        std::fs::write(bucket_dir.join(BLOBS_DIR).join(&blob), "stale").unwrap();

        storage.open("v1").await.unwrap();
        assert!(storage.entries("v1").await.unwrap().is_empty());
        assert!(storage.match_entry("v1", "GET https://rybuhome.com/").await.unwrap().is_none());
        assert!(!bucket_dir.join(BLOBS_DIR).join(&blob).exists());
    }

    #[tokio::test]
    async fn test_overwritten_body_is_collected() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).await.unwrap();
        storage.put("v1", "GET https://rybuhome.com/", Response::ok("first")).await.unwrap();
        storage.put("v1", "GET https://rybuhome.com/", Response::ok("second")).await.unwrap();

        let blobs = dir.path().join(DiskStorage::dir_name("v1")).join(BLOBS_DIR);
        let names: Vec<String> = std::fs::read_dir(&blobs)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![hex::encode(Sha256::digest(b"second"))]);

        let hit = storage.match_entry("v1", "GET https://rybuhome.com/").await.unwrap().unwrap();
        assert_eq!(hit.body, "second");
    }

    #[tokio::test]
    async fn test_interrupted_blob_write_is_not_served() {
        let dir = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).await.unwrap();
        storage.open("v1").await.unwrap();

        // Half-written body from a crash before the rename
        let digest = hex::encode(Sha256::digest(b"body { margin: 0 }"));
        let blobs = dir.path().join(DiskStorage::dir_name("v1")).join(BLOBS_DIR);
        std::fs::write(blobs.join(format!("{}.tmp", digest)), "body {").unwrap();

        storage.put("v1", "GET https://rybuhome.com/style.css", css()).await.unwrap();
        let hit = storage
            .match_entry("v1", "GET https://rybuhome.com/style.css")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.body, "body { margin: 0 }");
        assert!(!blobs.join(format!("{}.tmp", digest)).exists());
    }
}
