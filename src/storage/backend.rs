//! Storage backend implementations.
//!
//! This module provides two key-value backends:
//! - InMemoryStore: ordered, ephemeral storage for tests and simulations
//! - FileStore: JSON file with hex-encoded keys and values
//!
//! [`TypedStore`] layers bincode (de)serialization on top of either one.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// STORAGE TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Key type for storage operations
pub type StorageKey = Vec<u8>;

/// Value type for storage operations
pub type StorageValue = Vec<u8>;

/// Trait for storage backends
pub trait StorageBackend: Send + Sync {
    /// Get a value by key
    fn get(&self, key: &[u8]) -> Result<Option<StorageValue>>;

    /// Set a value for a key
    fn set(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a key
    fn delete(&self, key: &[u8]) -> Result<bool>;

    /// Check if a key exists
    fn exists(&self, key: &[u8]) -> Result<bool>;

    /// List all keys with a given prefix, in key order
    fn list_prefix(&self, prefix: &[u8]) -> Result<Vec<StorageKey>>;

    /// Flush any pending writes to persistent storage
    fn flush(&self) -> Result<()>;

    /// Clear all data
    fn clear(&self) -> Result<()>;
}

impl<B: StorageBackend> StorageBackend for Arc<B> {
    fn get(&self, key: &[u8]) -> Result<Option<StorageValue>> {
        (**self).get(key)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        (**self).set(key, value)
    }

    fn delete(&self, key: &[u8]) -> Result<bool> {
        (**self).delete(key)
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        (**self).exists(key)
    }

    fn list_prefix(&self, prefix: &[u8]) -> Result<Vec<StorageKey>> {
        (**self).list_prefix(prefix)
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }
}

fn lock_error<E: std::fmt::Display>(e: E) -> Error {
    Error::Storage(format!("lock poisoned: {}", e))
}

fn keys_with_prefix(data: &BTreeMap<Vec<u8>, Vec<u8>>, prefix: &[u8]) -> Vec<StorageKey> {
    data.range(prefix.to_vec()..)
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, _)| k.clone())
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// IN-MEMORY STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory storage backend (for testing and ephemeral use)
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get number of entries
    pub fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageBackend for InMemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<StorageValue>> {
        let data = self.data.read().map_err(lock_error)?;
        Ok(data.get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut data = self.data.write().map_err(lock_error)?;
        data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<bool> {
        let mut data = self.data.write().map_err(lock_error)?;
        Ok(data.remove(key).is_some())
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        let data = self.data.read().map_err(lock_error)?;
        Ok(data.contains_key(key))
    }

    fn list_prefix(&self, prefix: &[u8]) -> Result<Vec<StorageKey>> {
        let data = self.data.read().map_err(lock_error)?;
        Ok(keys_with_prefix(&data, prefix))
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut data = self.data.write().map_err(lock_error)?;
        data.clear();
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILE-BASED STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// File-based storage backend using JSON
#[derive(Debug)]
pub struct FileStore {
    /// Base directory for storage
    base_path: PathBuf,
    /// In-memory cache
    cache: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
    /// Whether cache is dirty and needs flushing
    dirty: RwLock<bool>,
}

impl FileStore {
    /// Name of the data file inside the base directory
    pub const DATA_FILE: &'static str = "hub_state.json";

    /// Open (or create) a file store at the given directory
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();

        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                Error::Storage(format!("create {}: {}", base_path.display(), e))
            })?;
        }

        let store = Self {
            base_path,
            cache: RwLock::new(BTreeMap::new()),
            dirty: RwLock::new(false),
        };
        store.load_from_disk()?;

        Ok(store)
    }

    /// Path of the data file
    pub fn data_file_path(&self) -> PathBuf {
        self.base_path.join(Self::DATA_FILE)
    }

    fn load_from_disk(&self) -> Result<()> {
        let path = self.data_file_path();
        if !path.exists() {
            return Ok(());
        }

        let file = File::open(&path)
            .map_err(|e| Error::Storage(format!("open {}: {}", path.display(), e)))?;

        // Hex-encoded keys and values
        let data: BTreeMap<String, String> = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::Deserialization(format!("parse {}: {}", path.display(), e)))?;

        let mut cache = self.cache.write().map_err(lock_error)?;
        for (key_hex, value_hex) in data {
            let key = hex::decode(&key_hex)
                .map_err(|e| Error::Deserialization(format!("invalid key: {}", e)))?;
            let value = hex::decode(&value_hex)
                .map_err(|e| Error::Deserialization(format!("invalid value: {}", e)))?;
            cache.insert(key, value);
        }

        Ok(())
    }

    fn save_to_disk(&self) -> Result<()> {
        let cache = self.cache.read().map_err(lock_error)?;
        let data: BTreeMap<String, String> = cache
            .iter()
            .map(|(k, v)| (hex::encode(k), hex::encode(v)))
            .collect();

        let path = self.data_file_path();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::Storage(format!("open {} for writing: {}", path.display(), e)))?;

        serde_json::to_writer_pretty(BufWriter::new(file), &data)
            .map_err(|e| Error::Serialization(format!("write {}: {}", path.display(), e)))?;

        *self.dirty.write().map_err(lock_error)? = false;
        Ok(())
    }

    fn mark_dirty(&self) -> Result<()> {
        *self.dirty.write().map_err(lock_error)? = true;
        Ok(())
    }
}

impl StorageBackend for FileStore {
    fn get(&self, key: &[u8]) -> Result<Option<StorageValue>> {
        let cache = self.cache.read().map_err(lock_error)?;
        Ok(cache.get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.cache
            .write()
            .map_err(lock_error)?
            .insert(key.to_vec(), value.to_vec());
        self.mark_dirty()
    }

    fn delete(&self, key: &[u8]) -> Result<bool> {
        let existed = self.cache.write().map_err(lock_error)?.remove(key).is_some();
        if existed {
            self.mark_dirty()?;
        }
        Ok(existed)
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        let cache = self.cache.read().map_err(lock_error)?;
        Ok(cache.contains_key(key))
    }

    fn list_prefix(&self, prefix: &[u8]) -> Result<Vec<StorageKey>> {
        let cache = self.cache.read().map_err(lock_error)?;
        Ok(keys_with_prefix(&cache, prefix))
    }

    fn flush(&self) -> Result<()> {
        let dirty = *self.dirty.read().map_err(lock_error)?;
        if dirty {
            self.save_to_disk()?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.cache.write().map_err(lock_error)?.clear();
        self.mark_dirty()
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(error = %e, "file store flush on drop failed");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TYPED STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Type-safe wrapper around a storage backend
pub struct TypedStore<B: StorageBackend> {
    backend: B,
}

impl<B: StorageBackend> TypedStore<B> {
    /// Create a new typed store
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Get a typed value
    pub fn get<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>> {
        match self.backend.get(key)? {
            Some(data) => {
                let value = bincode::deserialize(&data)
                    .map_err(|e| Error::Deserialization(format!("decode value: {}", e)))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Set a typed value
    pub fn set<T: Serialize>(&self, key: &[u8], value: &T) -> Result<()> {
        let data = bincode::serialize(value)
            .map_err(|e| Error::Serialization(format!("encode value: {}", e)))?;
        self.backend.set(key, &data)
    }

    /// Delete a value
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        self.backend.delete(key)
    }

    /// List keys with prefix
    pub fn list_prefix(&self, prefix: &[u8]) -> Result<Vec<StorageKey>> {
        self.backend.list_prefix(prefix)
    }

    /// Load every value stored under a prefix, in key order
    pub fn load_prefix<T: DeserializeOwned>(&self, prefix: &[u8]) -> Result<Vec<T>> {
        let mut values = Vec::new();
        for key in self.backend.list_prefix(prefix)? {
            if let Some(value) = self.get(&key)? {
                values.push(value);
            }
        }
        Ok(values)
    }

    /// Delete every key under a prefix; returns the number removed
    pub fn clear_prefix(&self, prefix: &[u8]) -> Result<usize> {
        let mut removed = 0;
        for key in self.backend.list_prefix(prefix)? {
            if self.backend.delete(&key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Flush pending writes
    pub fn flush(&self) -> Result<()> {
        self.backend.flush()
    }

    /// Clear all data
    pub fn clear(&self) -> Result<()> {
        self.backend.clear()
    }

    /// Get the underlying backend
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// KEY PREFIXES
// ═══════════════════════════════════════════════════════════════════════════════

/// Key prefixes for different data types
pub mod prefixes {
    /// Position records, keyed by address
    pub const POSITION: &[u8] = b"pos:";
    /// Live challenges, keyed by big-endian number
    pub const CHALLENGE: &[u8] = b"chl:";
    /// Deferred payouts, keyed by asset and beneficiary
    pub const PAYOUT: &[u8] = b"pay:";
    /// Hub metadata (ledgers, nonces, counters, clock)
    pub const META: &[u8] = b"meta:";
}

/// Create a key with a prefix
pub fn make_key(prefix: &[u8], key: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(prefix.len() + key.len());
    result.extend_from_slice(prefix);
    result.extend_from_slice(key);
    result
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
