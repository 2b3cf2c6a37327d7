//! Key store contract and its file-backed implementation.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::keys::record::{KeyId, KeyRecord, Lifetime};
use crate::observability::metrics;

/// Errors raised by a key store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("key store file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("key store unavailable: {0}")]
    Unavailable(String),
}

/// Durable mapping from key string to [`KeyRecord`].
///
/// The proxy only ever calls [`KeyStore::lookup`]; the remaining operations
/// back the key lifecycle endpoints.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Find the record owning `key`.
    async fn lookup(&self, key: &str) -> Result<Option<KeyRecord>, StoreError>;

    /// Issue and persist a new record.
    async fn create(&self, region: &str, lifetime: Lifetime) -> Result<KeyRecord, StoreError>;

    /// Delete a record by id. Returns whether a record was removed.
    async fn delete(&self, id: KeyId) -> Result<bool, StoreError>;

    /// All records, oldest first.
    async fn list_all(&self) -> Result<Vec<KeyRecord>, StoreError>;
}

/// Concurrent in-memory store, optionally persisted as a JSON file.
///
/// Every mutation rewrites the file (write-to-temp then rename), so the file
/// always holds a complete snapshot.
#[derive(Clone, Default)]
pub struct FileKeyStore {
    /// key string -> record
    records: Arc<DashMap<String, KeyRecord>>,
    persistence_path: Option<PathBuf>,
    write_lock: Arc<Mutex<()>>,
}

impl FileKeyStore {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open a store backed by `path`, loading existing records if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let store = Self {
            persistence_path: Some(path.clone()),
            ..Self::default()
        };

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            let records: Vec<KeyRecord> = serde_json::from_reader(reader)?;
            for record in records {
                store.records.insert(record.key.clone(), record);
            }
            tracing::info!(path = ?path, count = store.records.len(), "Loaded key records");
        } else {
            tracing::info!(path = ?path, "Key store file not found, starting empty");
        }

        metrics::record_keys_stored(store.records.len());
        Ok(store)
    }

    /// Insert an existing record as-is (imports and tests).
    pub fn insert(&self, record: KeyRecord) {
        self.records.insert(record.key.clone(), record);
        metrics::record_keys_stored(self.records.len());
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write the current snapshot to disk, if persistence is configured.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        let _guard = self.write_lock.lock().await;
        let snapshot = self.snapshot();
        write_snapshot(path, &snapshot)?;
        tracing::debug!(path = ?path, count = snapshot.len(), "Saved key records");
        Ok(())
    }

    fn snapshot(&self) -> Vec<KeyRecord> {
        let mut records: Vec<KeyRecord> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| {
            a.issued_at
                .cmp(&b.issued_at)
                .then_with(|| a.id.to_string().cmp(&b.id.to_string()))
        });
        records
    }
}

fn write_snapshot(path: &Path, records: &[KeyRecord]) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    {
        let writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer_pretty(writer, records)?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[async_trait]
impl KeyStore for FileKeyStore {
    async fn lookup(&self, key: &str) -> Result<Option<KeyRecord>, StoreError> {
        Ok(self.records.get(key).map(|r| r.value().clone()))
    }

    async fn create(&self, region: &str, lifetime: Lifetime) -> Result<KeyRecord, StoreError> {
        let mut record = KeyRecord::issue(region, lifetime);
        // Keys are unique across the store.
        while self.records.contains_key(&record.key) {
            record = KeyRecord::issue(region, lifetime);
        }
        self.records.insert(record.key.clone(), record.clone());
        metrics::record_keys_stored(self.records.len());

        if let Err(e) = self.flush().await {
            self.records.remove(&record.key);
            metrics::record_keys_stored(self.records.len());
            return Err(e);
        }

        tracing::info!(id = %record.id, region = %record.region, lifetime = record.lifetime_seconds, "Key issued");
        Ok(record)
    }

    async fn delete(&self, id: KeyId) -> Result<bool, StoreError> {
        let key = self
            .records
            .iter()
            .find(|r| r.value().id == id)
            .map(|r| r.key().clone());

        let Some(key) = key else {
            return Ok(false);
        };

        let removed = self.records.remove(&key);
        metrics::record_keys_stored(self.records.len());

        if let Err(e) = self.flush().await {
            if let Some((k, record)) = removed {
                self.records.insert(k, record);
                metrics::record_keys_stored(self.records.len());
            }
            return Err(e);
        }

        tracing::info!(id = %id, "Key deleted");
        Ok(true)
    }

    async fn list_all(&self) -> Result<Vec<KeyRecord>, StoreError> {
        Ok(self.snapshot())
    }
}
