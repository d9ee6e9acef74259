//! Persisted key-value memory store.
//!
//! Records live in memory behind a single async mutex and the whole record
//! set is rewritten to a JSON file after every mutation. The file is a flat
//! object mapping each key to `{content, metadata, timestamp}`.

use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub key: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Creation time of this version of the record.
    pub timestamp: DateTime<Utc>,
}

/// On-disk shape of a record; the key is the enclosing map key.
#[derive(Deserialize)]
struct StoredMemory {
    content: String,
    #[serde(default)]
    metadata: Map<String, Value>,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct StoredMemoryRef<'a> {
    content: &'a str,
    metadata: &'a Map<String, Value>,
    timestamp: &'a DateTime<Utc>,
}

/// Records plus their iteration order (oldest write first).
#[derive(Default)]
struct Records {
    entries: HashMap<String, MemoryRecord>,
    order: Vec<String>,
}

impl Records {
    fn upsert(&mut self, record: MemoryRecord) {
        // A replacement moves to the back: it is now the newest write
        if self.entries.contains_key(&record.key) {
            self.order.retain(|k| k != &record.key);
        }
        self.order.push(record.key.clone());
        self.entries.insert(record.key.clone(), record);
    }

    fn remove(&mut self, key: &str) -> bool {
        if self.entries.remove(key).is_none() {
            return false;
        }
        self.order.retain(|k| k != key);
        true
    }

    fn iter(&self) -> impl Iterator<Item = &MemoryRecord> {
        self.order.iter().filter_map(|k| self.entries.get(k))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Serialize for Records {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter().map(|r| {
            (
                &r.key,
                StoredMemoryRef {
                    content: &r.content,
                    metadata: &r.metadata,
                    timestamp: &r.timestamp,
                },
            )
        }))
    }
}

pub struct MemoryStore {
    path: PathBuf,
    records: Mutex<Records>,
}

impl MemoryStore {
    /// Open the store backed by `path`, loading existing records.
    ///
    /// A missing file starts an empty store. An unreadable or corrupted file
    /// also starts an empty store, with a warning; it is overwritten on the
    /// next mutation.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match load_records(&path) {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Memory file unusable, starting with an empty store"
                );
                Records::default()
            }
        };

        tracing::info!(path = %path.display(), records = records.len(), "Memory store opened");

        Self {
            path,
            records: Mutex::new(records),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or silently replace the record under `key`.
    pub async fn add(
        &self,
        key: &str,
        content: &str,
        metadata: Option<Map<String, Value>>,
    ) -> MemoryRecord {
        let record = MemoryRecord {
            key: key.to_string(),
            content: content.to_string(),
            metadata: metadata.unwrap_or_default(),
            timestamp: Utc::now(),
        };

        let mut records = self.records.lock().await;
        records.upsert(record.clone());
        self.persist(&records).await;

        record
    }

    pub async fn get(&self, key: &str) -> Option<MemoryRecord> {
        self.records.lock().await.entries.get(key).cloned()
    }

    /// Records whose content contains `query`, ignoring case.
    pub async fn search(&self, query: &str) -> Vec<MemoryRecord> {
        let needle = query.to_lowercase();
        self.records
            .lock()
            .await
            .iter()
            .filter(|r| r.content.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    /// Remove `key`. Returns false, without touching the file, when absent.
    pub async fn delete(&self, key: &str) -> bool {
        let mut records = self.records.lock().await;
        if !records.remove(key) {
            return false;
        }
        self.persist(&records).await;
        true
    }

    pub async fn list_all(&self) -> Vec<MemoryRecord> {
        self.records.lock().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Best-effort write-through. Failures are logged and swallowed so the
    /// in-memory mutation still stands.
    async fn persist(&self, records: &Records) {
        match save_records(&self.path, records).await {
            Ok(bytes) => {
                metrics::counter!("memory_writes_total").increment(1);
                tracing::debug!(
                    path = %self.path.display(),
                    records = records.len(),
                    size_bytes = bytes,
                    "Memory file saved"
                );
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to save memory file");
            }
        }
    }
}

fn load_records(path: &Path) -> Result<Records> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "Memory file does not exist");
        return Ok(Records::default());
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|e| AppError::PersistenceError(format!("Failed to read memory file: {}", e)))?;
    if raw.trim().is_empty() {
        return Ok(Records::default());
    }

    let stored: HashMap<String, StoredMemory> = serde_json::from_str(&raw)
        .map_err(|e| AppError::PersistenceError(format!("Failed to parse memory file: {}", e)))?;

    // Insertion order is reconstructed from write times
    let mut loaded: Vec<MemoryRecord> = stored
        .into_iter()
        .map(|(key, m)| MemoryRecord {
            key,
            content: m.content,
            metadata: m.metadata,
            timestamp: m.timestamp,
        })
        .collect();
    loaded.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.key.cmp(&b.key)));

    let mut records = Records::default();
    for record in loaded {
        records.upsert(record);
    }
    Ok(records)
}

/// Write the full record set via a temp file and rename.
async fn save_records(path: &Path, records: &Records) -> Result<usize> {
    let data = serde_json::to_vec_pretty(records)
        .map_err(|e| AppError::PersistenceError(format!("Failed to encode memories: {}", e)))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            AppError::PersistenceError(format!("Failed to create memory directory: {}", e))
        })?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, &data).await.map_err(|e| {
        AppError::PersistenceError(format!("Failed to write memory file: {}", e))
    })?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| {
        AppError::PersistenceError(format!("Failed to replace memory file: {}", e))
    })?;

    Ok(data.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn meta(value: Value) -> Option<Map<String, Value>> {
        value.as_object().cloned()
    }

    #[tokio::test]
    async fn test_add_then_get_and_replace() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::open(dir.path().join("memories.json"));

        store.add("k", "v", None).await;
        assert_eq!(store.get("k").await.unwrap().content, "v");

        store.add("k", "v2", meta(json!({"source": "test"}))).await;
        let record = store.get("k").await.unwrap();
        assert_eq!(record.content, "v2");
        assert_eq!(record.metadata["source"], "test");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_substring() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::open(dir.path().join("memories.json"));

        store.add("greeting", "say hello world", None).await;
        store.add("other", "nothing to see", None).await;

        let hits = store.search("HELLO").await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "greeting");
        assert!(store.search("absent").await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memories.json");
        let store = MemoryStore::open(&path);

        store.add("a", "alpha", None).await;
        let before = std::fs::read(&path).unwrap();

        assert!(!store.delete("missing").await);
        assert_eq!(std::fs::read(&path).unwrap(), before);

        assert!(store.delete("a").await);
        assert!(store.get("a").await.is_none());
        assert_ne!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_records_survive_reopen_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("memories.json");

        {
            let store = MemoryStore::open(&path);
            store.add("first", "one", None).await;
            store.add("second", "two", meta(json!({"n": 2}))).await;
            store.add("third", "three", None).await;
            store.add("first", "one again", None).await;
        }

        let reopened = MemoryStore::open(&path);
        let keys: Vec<String> = reopened
            .list_all()
            .await
            .into_iter()
            .map(|r| r.key)
            .collect();

        assert_eq!(keys, vec!["second", "third", "first"]);
        assert_eq!(reopened.get("first").await.unwrap().content, "one again");
        assert_eq!(reopened.get("second").await.unwrap().metadata["n"], 2);
    }

    #[tokio::test]
    async fn test_file_is_flat_key_mapping() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memories.json");
        let store = MemoryStore::open(&path);

        store.add("k", "v", None).await;

        let on_disk: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk["k"]["content"], "v");
        assert!(on_disk["k"]["timestamp"].is_string());
        assert!(on_disk["k"].get("key").is_none());
    }

    #[tokio::test]
    async fn test_corrupted_file_yields_empty_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memories.json");
        std::fs::write(&path, "{ this is not json").unwrap();

        let store = MemoryStore::open(&path);
        assert!(store.is_empty().await);

        // The next write replaces the corrupted file
        store.add("k", "v", None).await;
        assert_eq!(MemoryStore::open(&path).get("k").await.unwrap().content, "v");
    }

    #[tokio::test]
    async fn test_save_failure_is_swallowed() {
        let dir = tempdir().unwrap();
        // A directory where the file should be makes every write fail
        let path = dir.path().join("memories.json");
        std::fs::create_dir(&path).unwrap();

        let store = MemoryStore::open(&path);
        store.add("k", "v", None).await;

        assert_eq!(store.get("k").await.unwrap().content, "v");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_all_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memories.json");
        let store = Arc::new(MemoryStore::open(&path));

        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store
                        .add(&format!("key-{}", i), &format!("content {}", i), None)
                        .await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.len().await, 64);

        let reopened = MemoryStore::open(&path);
        assert_eq!(reopened.len().await, 64);
        assert_eq!(reopened.get("key-17").await.unwrap().content, "content 17");
    }
}
