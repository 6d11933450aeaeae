use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised by a [`StorageAccessor`]
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Error, uniffi::Error)]
pub enum StorageError {
    /// The backing store cannot be reached at all
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Reason reported by the host
        message: String,
    },
    /// Reading a key failed
    #[error("failed to read {key}: {message}")]
    ReadFailure {
        /// Physical key that was being read
        key: String,
        /// Reason reported by the host
        message: String,
    },
    /// Writing or removing a key failed
    #[error("failed to write {key}: {message}")]
    WriteFailure {
        /// Physical key that was being written
        key: String,
        /// Reason reported by the host
        message: String,
    },
    /// An unexpected error occurred in the foreign callback
    #[error("unexpected error in foreign callback: {reason}")]
    UnexpectedUniFFICallbackError {
        /// Reason reported by UniFFI
        reason: String,
    },
}

/// Required for foreign trait support: a panicking or throwing host implementation
/// surfaces as an error instead of aborting the Rust side.
impl From<uniffi::UnexpectedUniFFICallbackError> for StorageError {
    fn from(e: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError { reason: e.reason }
    }
}

/// Raw access to the host's persisted key-value store.
///
/// Keys are flat strings and values are JSON text. The migration engine only ever calls the
/// three operations below; durability and consistency are the host's responsibility.
///
/// Android typically backs this with `SharedPreferences` or `DataStore`, iOS with
/// `UserDefaults` or a file, and tests with [`InMemoryStorageAccessor`].
#[uniffi::export(with_foreign)]
#[async_trait]
pub trait StorageAccessor: Send + Sync {
    /// Read the raw value stored under `key`.
    ///
    /// Returns `Ok(None)` when the key is absent; absence is never an error.
    ///
    /// # Errors
    /// - `StorageError::Unavailable` if the store cannot be reached
    /// - `StorageError::ReadFailure` if the value cannot be read
    async fn read_raw(&self, key: String) -> Result<Option<String>, StorageError>;

    /// Write `value` under `key`. `None` removes the key; removing an absent key is a no-op.
    ///
    /// # Errors
    /// - `StorageError::Unavailable` if the store cannot be reached
    /// - `StorageError::WriteFailure` if the value cannot be persisted
    async fn write_raw(&self, key: String, value: Option<String>) -> Result<(), StorageError>;

    /// List every top-level key starting with `prefix`. An empty prefix lists all keys.
    ///
    /// # Errors
    /// - `StorageError::Unavailable` if the store cannot be reached
    async fn list_keys(&self, prefix: String) -> Result<Vec<String>, StorageError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<String, String>,
    unavailable: bool,
    failing_writes: BTreeSet<String>,
}

/// In-memory [`StorageAccessor`], used as the "memory" medium and by tests.
///
/// It can simulate an unreachable backend ([`Self::set_available`]) and per-key write
/// failures ([`Self::fail_writes_for`]).
#[derive(Debug, Default)]
pub struct InMemoryStorageAccessor {
    state: Mutex<MemoryState>,
}

impl InMemoryStorageAccessor {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with JSON values
    #[must_use]
    pub fn with_entries<K: Into<String>>(
        entries: impl IntoIterator<Item = (K, serde_json::Value)>,
    ) -> Self {
        let store = Self::new();
        for (key, value) in entries {
            store.insert_json(key, &value);
        }
        store
    }

    /// Stores `value` as JSON text under `key`
    pub fn insert_json(&self, key: impl Into<String>, value: &serde_json::Value) {
        self.insert_raw(key, value.to_string());
    }

    /// Stores raw text under `key`, bypassing JSON encoding
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        self.with_state(|state| {
            state.entries.insert(key.into(), value.into());
        });
    }

    /// Returns the raw text stored under `key`
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.with_state(|state| state.entries.get(key).cloned())
    }

    /// Returns the value under `key` parsed as JSON, or `None` if absent or not JSON
    #[must_use]
    pub fn json(&self, key: &str) -> Option<serde_json::Value> {
        self.raw(key).and_then(|raw| serde_json::from_str(&raw).ok())
    }

    /// Returns every key currently stored, in order
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.with_state(|state| state.entries.keys().cloned().collect())
    }

    /// Returns a copy of every entry, in key order
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.with_state(|state| state.entries.clone())
    }

    /// Toggles whether the store behaves as reachable
    pub fn set_available(&self, available: bool) {
        self.with_state(|state| state.unavailable = !available);
    }

    /// Makes every subsequent write to `key` fail with `StorageError::WriteFailure`
    pub fn fail_writes_for(&self, key: impl Into<String>) {
        self.with_state(|state| {
            state.failing_writes.insert(key.into());
        });
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> R {
        // A poisoned lock only means another thread panicked mid-update of a plain map.
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }

    fn check_available(state: &MemoryState) -> Result<(), StorageError> {
        if state.unavailable {
            return Err(StorageError::Unavailable {
                message: "in-memory store marked unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAccessor for InMemoryStorageAccessor {
    async fn read_raw(&self, key: String) -> Result<Option<String>, StorageError> {
        self.with_state(|state| {
            Self::check_available(state)?;
            Ok(state.entries.get(&key).cloned())
        })
    }

    async fn write_raw(&self, key: String, value: Option<String>) -> Result<(), StorageError> {
        self.with_state(|state| {
            Self::check_available(state)?;
            if state.failing_writes.contains(&key) {
                return Err(StorageError::WriteFailure {
                    key,
                    message: "write rejected".to_string(),
                });
            }
            match value {
                Some(value) => {
                    state.entries.insert(key, value);
                }
                None => {
                    state.entries.remove(&key);
                }
            }
            Ok(())
        })
    }

    async fn list_keys(&self, prefix: String) -> Result<Vec<String>, StorageError> {
        self.with_state(|state| {
            Self::check_available(state)?;
            Ok(state
                .entries
                .keys()
                .filter(|key| key.starts_with(&prefix))
                .cloned()
                .collect())
        })
    }
}
