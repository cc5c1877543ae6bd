//! Durable key -> (text, vector) storage.
//!
//! The store keeps the current records in an immutable snapshot behind an
//! `Arc`. Readers clone the `Arc` and work on that snapshot, so they never
//! observe a half-applied write. Writers are serialized by a mutex, build
//! the next snapshot off to the side, persist it, and only then publish it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{StoreError, StoreResult};

/// Version tag written into snapshot files.
const SNAPSHOT_VERSION: u32 = 1;

/// A stored item: its key, the text that was embedded and the vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier of the source item.
    pub key: String,

    /// Text the vector was computed from.
    pub text: String,

    /// The embedding vector.
    pub vector: Embedding,
}

#[derive(Debug, Clone, Default)]
struct Snapshot {
    dimension: Option<usize>,
    records: HashMap<String, Arc<Record>>,
}

#[derive(Serialize)]
struct SnapshotFileRef<'a> {
    version: u32,
    dimension: Option<usize>,
    records: Vec<&'a Record>,
}

#[derive(Deserialize)]
struct SnapshotFile {
    version: u32,
    dimension: Option<usize>,
    records: Vec<Record>,
}

/// Embedding store holding at most one record per key.
///
/// The vector dimension is fixed by the first successful upsert (or up front
/// with [`EmbeddingStore::with_dimension`]) and every later write must match
/// it.
pub struct EmbeddingStore {
    /// Current published snapshot.
    snapshot: RwLock<Arc<Snapshot>>,

    /// Serializes writers.
    writer: Mutex<()>,

    /// Snapshot file, if the store is persistent.
    path: Option<PathBuf>,
}

impl EmbeddingStore {
    /// Create a store that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            writer: Mutex::new(()),
            path: None,
        }
    }

    /// Open a persistent store backed by the snapshot file at `path`.
    ///
    /// A missing file yields an empty store; the file is created on the
    /// first write.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        let snapshot = if fs::try_exists(&path).await? {
            let content = fs::read_to_string(&path).await.map_err(|e| {
                StoreError::Unavailable(format!("failed to read {}: {e}", path.display()))
            })?;
            let snapshot = decode_snapshot(&content)?;
            info!(
                "Loaded {} records from {}",
                snapshot.records.len(),
                path.display()
            );
            snapshot
        } else {
            debug!("No snapshot at {}, starting empty", path.display());
            Snapshot::default()
        };

        Ok(Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
            path: Some(path),
        })
    }

    /// Fix the vector dimension before any record is written.
    ///
    /// Fails when the store already holds records of another dimension.
    pub fn with_dimension(mut self, dimension: usize) -> StoreResult<Self> {
        let snapshot = Arc::make_mut(self.snapshot.get_mut());
        match snapshot.dimension {
            Some(expected) if expected != dimension => {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: dimension,
                });
            }
            _ => snapshot.dimension = Some(dimension),
        }
        Ok(self)
    }

    /// Path of the snapshot file, if persistent.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Insert or replace the record for `key`.
    ///
    /// On error the store is left exactly as it was.
    pub async fn upsert(
        &self,
        key: impl Into<String>,
        text: impl Into<String>,
        vector: Embedding,
    ) -> StoreResult<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(StoreError::EmptyKey);
        }
        if vector.is_empty() {
            return Err(StoreError::EmptyVector);
        }
        if let Some(index) = vector.iter().position(|v| !v.is_finite()) {
            return Err(StoreError::InvalidVector { index });
        }

        let _guard = self.writer.lock().await;
        let current = Arc::clone(&*self.snapshot.read().await);

        if let Some(expected) = current.dimension {
            if vector.len() != expected {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let mut next = (*current).clone();
        next.dimension = Some(vector.len());
        let replaced = next
            .records
            .insert(
                key.clone(),
                Arc::new(Record {
                    key: key.clone(),
                    text: text.into(),
                    vector,
                }),
            )
            .is_some();

        if let Some(ref path) = self.path {
            save_snapshot(path, &next).await?;
        }

        *self.snapshot.write().await = Arc::new(next);

        if replaced {
            debug!("Replaced record: {key}");
        } else {
            debug!("Inserted record: {key}");
        }
        Ok(())
    }

    /// Get a copy of the record for `key`.
    pub async fn get(&self, key: &str) -> StoreResult<Record> {
        let snapshot = self.current().await;
        snapshot
            .records
            .get(key)
            .map(|r| Record::clone(r))
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    /// Copies of every current record, in no particular order.
    pub async fn scan_all(&self) -> Vec<Record> {
        let snapshot = self.current().await;
        snapshot.records.values().map(|r| Record::clone(r)).collect()
    }

    /// Check if a key exists in the store.
    pub async fn contains(&self, key: &str) -> bool {
        self.current().await.records.contains_key(key)
    }

    /// All keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.current().await.records.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of records.
    pub async fn len(&self) -> usize {
        self.current().await.records.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.current().await.records.is_empty()
    }

    /// The fixed vector dimension, once known.
    pub async fn dimension(&self) -> Option<usize> {
        self.current().await.dimension
    }

    async fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }
}

fn decode_snapshot(content: &str) -> StoreResult<Snapshot> {
    let file: SnapshotFile = serde_json::from_str(content)?;
    if file.version != SNAPSHOT_VERSION {
        return Err(StoreError::Unavailable(format!(
            "unsupported snapshot version {}",
            file.version
        )));
    }

    let mut dimension = file.dimension;
    let mut records = HashMap::with_capacity(file.records.len());
    for record in file.records {
        if record.key.is_empty() {
            return Err(StoreError::Unavailable(
                "snapshot contains a record with an empty key".to_string(),
            ));
        }
        let expected = *dimension.get_or_insert(record.vector.len());
        if record.vector.len() != expected {
            return Err(StoreError::Unavailable(format!(
                "record {} has dimension {}, expected {expected}",
                record.key,
                record.vector.len()
            )));
        }
        let key = record.key.clone();
        if records.insert(key.clone(), Arc::new(record)).is_some() {
            return Err(StoreError::Unavailable(format!(
                "snapshot contains duplicate key {key}"
            )));
        }
    }

    Ok(Snapshot { dimension, records })
}

async fn save_snapshot(path: &Path, snapshot: &Snapshot) -> StoreResult<()> {
    let mut records: Vec<&Record> = snapshot.records.values().map(Arc::as_ref).collect();
    records.sort_by(|a, b| a.key.cmp(&b.key));

    let content = serde_json::to_string(&SnapshotFileRef {
        version: SNAPSHOT_VERSION,
        dimension: snapshot.dimension,
        records,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(|e| {
            StoreError::Unavailable(format!("failed to create {}: {e}", parent.display()))
        })?;
    }

    // Write atomically using a temp file
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, &content).await.map_err(|e| {
        StoreError::Unavailable(format!("failed to write {}: {e}", temp_path.display()))
    })?;
    fs::rename(&temp_path, path).await.map_err(|e| {
        StoreError::Unavailable(format!("failed to write {}: {e}", path.display()))
    })?;

    debug!(
        "Saved {} records to {}",
        snapshot.records.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = EmbeddingStore::in_memory();
        store
            .upsert("v1", "cats are great", vec![1.0, 0.0, 0.0])
            .await
            .unwrap();

        let record = store.get("v1").await.unwrap();
        assert_eq!(record.text, "cats are great");
        assert_eq!(record.vector, vec![1.0, 0.0, 0.0]);
        assert_eq!(store.dimension().await, Some(3));
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_key() {
        let store = EmbeddingStore::in_memory();
        store.upsert("v1", "old", vec![1.0, 0.0]).await.unwrap();
        store.upsert("v1", "new", vec![0.0, 1.0]).await.unwrap();

        assert_eq!(store.len().await, 1);
        let record = store.get("v1").await.unwrap();
        assert_eq!(record.text, "new");
        assert_eq!(record.vector, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_leaves_record_untouched() {
        let store = EmbeddingStore::in_memory();
        store.upsert("v1", "first", vec![1.0, 2.0, 3.0]).await.unwrap();

        let err = store.upsert("v1", "second", vec![1.0, 2.0]).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));

        let record = store.get("v1").await.unwrap();
        assert_eq!(record.text, "first");
        assert_eq!(record.vector, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_rejects_empty_key_and_vector() {
        let store = EmbeddingStore::in_memory();
        assert!(matches!(
            store.upsert("", "text", vec![1.0]).await,
            Err(StoreError::EmptyKey)
        ));
        assert!(matches!(
            store.upsert("k", "text", Vec::new()).await,
            Err(StoreError::EmptyVector)
        ));
        assert!(store.is_empty().await);
        assert_eq!(store.dimension().await, None);
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let store = EmbeddingStore::in_memory();
        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(key) if key == "nope"));
    }

    #[tokio::test]
    async fn test_with_dimension() {
        let store = EmbeddingStore::in_memory().with_dimension(4).unwrap();
        assert_eq!(store.dimension().await, Some(4));
        assert!(store.upsert("a", "a", vec![1.0; 3]).await.is_err());
        store.upsert("a", "a", vec![1.0; 4]).await.unwrap();
    }

    #[tokio::test]
    async fn test_scan_all_returns_every_record() {
        let store = EmbeddingStore::in_memory();
        for key in ["a", "b", "c"] {
            store.upsert(key, key, vec![1.0, 1.0]).await.unwrap();
        }

        let mut keys: Vec<String> = store.scan_all().await.into_iter().map(|r| r.key).collect();
        keys.sort();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(store.keys().await, keys);
    }

    #[tokio::test]
    async fn test_persistence_round_trip_is_exact() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/embeddings.json");
        let vector = vec![0.1_f32, -0.333_333_34, 1.0e-7, 123.456, f32::MIN_POSITIVE];

        {
            let store = EmbeddingStore::open(&path).await.unwrap();
            store.upsert("v1", "captions", vector.clone()).await.unwrap();
            store.upsert("v2", "more", vec![1.0; 5]).await.unwrap();
        }

        let store = EmbeddingStore::open(&path).await.unwrap();
        assert_eq!(store.len().await, 2);
        assert_eq!(store.dimension().await, Some(5));
        let record = store.get("v1").await.unwrap();
        assert_eq!(record.text, "captions");
        for (stored, original) in record.vector.iter().zip(&vector) {
            assert_eq!(stored.to_bits(), original.to_bits());
        }
    }

    #[tokio::test]
    async fn test_open_rejects_corrupt_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("embeddings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = EmbeddingStore::open(&path).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_open_rejects_inconsistent_dimensions() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("embeddings.json");
        let content = serde_json::json!({
            "version": 1,
            "dimension": null,
            "records": [
                {"key": "a", "text": "a", "vector": [1.0, 0.0]},
                {"key": "b", "text": "b", "vector": [1.0]}
            ]
        });
        std::fs::write(&path, content.to_string()).unwrap();

        let result = EmbeddingStore::open(&path).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_non_finite_vectors_rejected_and_snapshot_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("embeddings.json");
        let store = EmbeddingStore::open(&path).await.unwrap();
        store.upsert("good", "good", vec![1.0, 0.0]).await.unwrap();

        for vector in [
            vec![f32::NAN, 1.0],
            vec![1.0, f32::INFINITY],
            vec![f32::NEG_INFINITY, 0.0],
        ] {
            let err = store.upsert("bad", "bad", vector).await.unwrap_err();
            assert!(matches!(err, StoreError::InvalidVector { .. }), "{err}");
        }
        assert!(matches!(
            store.upsert("bad", "bad", vec![1.0, f32::NAN]).await,
            Err(StoreError::InvalidVector { index: 1 })
        ));
        assert!(!store.contains("bad").await);

        let reopened = EmbeddingStore::open(&path).await.unwrap();
        assert_eq!(reopened.keys().await, vec!["good".to_string()]);
        assert_eq!(reopened.get("good").await.unwrap().vector, vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_failed_persist_keeps_memory_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        // A directory where the snapshot file should be makes the rename fail.
        let path = temp_dir.path().join("embeddings.json");
        let store = EmbeddingStore::open(&path).await.unwrap();
        std::fs::create_dir_all(path.join("blocker")).unwrap();

        let result = store.upsert("v1", "text", vec![1.0]).await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert!(store.is_empty().await);
        assert_eq!(store.dimension().await, None);
    }

    #[tokio::test]
    async fn test_concurrent_writers_and_readers() {
        let store = Arc::new(EmbeddingStore::in_memory());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let key = format!("k{}", i % 4);
                store.upsert(key, format!("t{i}"), vec![i as f32, 1.0]).await.unwrap();
                for record in store.scan_all().await {
                    assert_eq!(record.vector.len(), 2);
                    assert_eq!(record.text, format!("t{}", record.vector[0] as usize));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.len().await, 4);
    }
}
