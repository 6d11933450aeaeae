use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::migration::error::{MigrationError, MigrationResult};
use crate::migration::task_group::AccountTaskGroup;
use crate::primitives::config::MigrationConfig;
use crate::primitives::storage::StorageAccessor;
use crate::state::{
    is_account_record_key, AccountRecord, KeyDefinition, ACCOUNT_INDEX_KEY, LEGACY_GLOBAL_KEY,
    USER_KEY_PREFIX, VERSION_MARKER_KEY,
};

/// An account blob together with the id it is stored under
#[derive(Debug, Clone, PartialEq)]
pub struct AccountEntry<T> {
    /// The account's user id (also its physical key)
    pub user_id: String,
    /// The parsed blob
    pub account: T,
}

/// Façade over the [`StorageAccessor`] that understands the two-tier key layout.
///
/// Migrators use it to read legacy account blobs, to move values into
/// [`KeyDefinition`]-addressed slots and back, and the runner uses it for the version marker.
/// Absence is never an error: every getter returns `None` for a missing key.
#[derive(Clone)]
pub struct MigrationHelper {
    accessor: Arc<dyn StorageAccessor>,
    config: MigrationConfig,
}

impl MigrationHelper {
    /// Creates a helper over `accessor`
    #[must_use]
    pub fn new(accessor: Arc<dyn StorageAccessor>, config: MigrationConfig) -> Self {
        Self { accessor, config }
    }

    /// A task group sized by the configured account concurrency
    #[must_use]
    pub fn account_task_group(&self, label: impl Into<String>) -> AccountTaskGroup {
        AccountTaskGroup::new(label, self.config.account_concurrency())
    }

    // Version marker

    /// Reads the version marker; `None` when the store was never migrated
    ///
    /// # Errors
    /// - `MigrationError::StorageUnavailable` if the accessor cannot be reached
    /// - `MigrationError::Generic` if the marker is not an integer
    pub async fn current_version(&self) -> MigrationResult<Option<u32>> {
        let Some(raw) = self.read(VERSION_MARKER_KEY).await? else {
            return Ok(None);
        };
        let version = serde_json::from_str::<u32>(&raw)
            .with_context(|| format!("version marker {raw:?} is not a non-negative integer"))?;
        Ok(Some(version))
    }

    /// Persists the version marker
    ///
    /// # Errors
    /// Propagates accessor failures
    pub async fn set_current_version(&self, version: u32) -> MigrationResult<()> {
        self.write(VERSION_MARKER_KEY, Some(version.to_string())).await
    }

    // Legacy account records

    /// Enumerates every known account.
    ///
    /// The application-maintained account index is authoritative when present. Otherwise
    /// every top-level key that is neither reserved nor a key-addressed slot is taken to be
    /// an account blob. Order is preserved and duplicates are dropped.
    ///
    /// Without the index, accounts whose id is `global` or starts with `user_` or `global_`
    /// cannot be told apart from reserved keys and are not enumerated.
    ///
    /// # Errors
    /// - `MigrationError::StorageUnavailable` if the accessor cannot be reached
    /// - `MigrationError::JsonError` if the account index is not a list of strings
    pub async fn user_ids(&self) -> MigrationResult<Vec<String>> {
        let ids = match self.read_json::<Vec<String>>(ACCOUNT_INDEX_KEY).await? {
            Some(index) => index,
            None => {
                let keys = self.accessor.list_keys(String::new()).await?;
                let ids: Vec<String> = keys
                    .into_iter()
                    .filter(|key| is_account_record_key(key))
                    .collect();
                crate::warn!(
                    "migration.account_index_missing discovered={} note=ids_prefixed_user_or_global_need_the_index",
                    ids.len()
                );
                ids
            }
        };

        Ok(dedup_preserving_order(ids))
    }

    /// Ids of every user whose `key` slot currently holds a value, whether or not the user
    /// still has a legacy blob or appears in the account index
    ///
    /// # Errors
    /// - `MigrationError::StorageUnavailable` if the accessor cannot be reached
    pub async fn user_ids_with_slot(&self, key: &KeyDefinition) -> MigrationResult<Vec<String>> {
        let suffix = format!("_{}_{}", key.state().name(), key.key());
        let ids = self
            .accessor
            .list_keys(USER_KEY_PREFIX.to_string())
            .await?
            .into_iter()
            .filter_map(|physical_key| {
                physical_key
                    .strip_prefix(USER_KEY_PREFIX)?
                    .strip_suffix(suffix.as_str())
                    .filter(|user_id| !user_id.is_empty())
                    .map(str::to_string)
            })
            .collect();
        Ok(dedup_preserving_order(ids))
    }

    /// Every account a rollback into `key` has to visit: the enumerated accounts followed by
    /// any user that only has a value in the slot
    ///
    /// # Errors
    /// - `MigrationError::StorageUnavailable` if the accessor cannot be reached
    /// - `MigrationError::JsonError` if the account index is not a list of strings
    pub async fn user_ids_for_rollback(&self, key: &KeyDefinition) -> MigrationResult<Vec<String>> {
        let mut ids = self.user_ids().await?;
        ids.extend(self.user_ids_with_slot(key).await?);
        Ok(dedup_preserving_order(ids))
    }

    /// Reads one account blob, parsed as `T`; `None` if the account has no blob or the
    /// blob is JSON `null`
    ///
    /// # Errors
    /// - `MigrationError::MalformedAccountRecord` if the blob does not parse as `T`
    /// - `MigrationError::StorageUnavailable` if the accessor cannot be reached
    pub async fn get_account<T: DeserializeOwned>(&self, user_id: &str) -> MigrationResult<Option<T>> {
        let Some(raw) = self.read(user_id).await? else {
            return Ok(None);
        };
        serde_json::from_str::<Option<T>>(&raw)
            .map_err(|e| MigrationError::MalformedAccountRecord {
                user_id: user_id.to_string(),
                message: e.to_string(),
            })
    }

    /// Reads every account blob, parsed as `T`.
    ///
    /// Accounts without a blob are omitted. Malformed blobs are logged and skipped so that
    /// one bad record never hides the others.
    ///
    /// # Errors
    /// - `MigrationError::StorageUnavailable` if the accessor cannot be reached
    pub async fn get_accounts<T: DeserializeOwned + Send>(&self) -> MigrationResult<Vec<AccountEntry<T>>> {
        let mut entries = Vec::new();
        for user_id in self.user_ids().await? {
            match self.get_account::<T>(&user_id).await {
                Ok(Some(account)) => entries.push(AccountEntry { user_id, account }),
                Ok(None) => {}
                Err(MigrationError::MalformedAccountRecord { user_id, message }) => {
                    crate::warn!("migration.account_malformed user_id={user_id} error={message}");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(entries)
    }

    /// Overwrites the legacy blob of `user_id` with `account`. No field merging happens.
    ///
    /// # Errors
    /// Propagates accessor and serialization failures
    pub async fn set<T: Serialize + Sync>(&self, user_id: &str, account: &T) -> MigrationResult<()> {
        let raw = serde_json::to_string(account)?;
        self.write(user_id, Some(raw)).await
    }

    /// Reads the legacy global blob
    ///
    /// # Errors
    /// - `MigrationError::MalformedAccountRecord` (with the reserved key as id) if it is
    ///   not a JSON object
    /// - `MigrationError::StorageUnavailable` if the accessor cannot be reached
    pub async fn get_legacy_global(&self) -> MigrationResult<Option<AccountRecord>> {
        self.get_account(LEGACY_GLOBAL_KEY).await
    }

    /// Overwrites the legacy global blob
    ///
    /// # Errors
    /// Propagates accessor and serialization failures
    pub async fn set_legacy_global(&self, record: &AccountRecord) -> MigrationResult<()> {
        self.set(LEGACY_GLOBAL_KEY, record).await
    }

    // Key-addressed slots

    /// Reads the user-scoped slot `key` of `user_id`
    ///
    /// # Errors
    /// - `MigrationError::JsonError` if the stored value does not parse as `T`
    /// - `MigrationError::StorageUnavailable` if the accessor cannot be reached
    pub async fn get_from_user<T: DeserializeOwned>(
        &self,
        user_id: &str,
        key: &KeyDefinition,
    ) -> MigrationResult<Option<T>> {
        self.read_json(&key.user_storage_key(user_id)).await
    }

    /// Writes the user-scoped slot `key` of `user_id`; `None` removes it
    ///
    /// # Errors
    /// Propagates accessor failures
    pub async fn set_to_user(
        &self,
        user_id: &str,
        key: &KeyDefinition,
        value: Option<Value>,
    ) -> MigrationResult<()> {
        let physical_key = key.user_storage_key(user_id);
        self.write_value(&physical_key, key, value).await
    }

    /// Reads the global slot `key`
    ///
    /// # Errors
    /// - `MigrationError::JsonError` if the stored value does not parse as `T`
    /// - `MigrationError::StorageUnavailable` if the accessor cannot be reached
    pub async fn get<T: DeserializeOwned>(&self, key: &KeyDefinition) -> MigrationResult<Option<T>> {
        self.read_json(&key.global_storage_key()).await
    }

    /// Writes the global slot `key`; `None` removes it
    ///
    /// # Errors
    /// Propagates accessor failures
    pub async fn set_global(&self, key: &KeyDefinition, value: Option<Value>) -> MigrationResult<()> {
        let physical_key = key.global_storage_key();
        self.write_value(&physical_key, key, value).await
    }

    /// Whether the store holds nothing a migrator could act on: no version marker,
    /// no accounts and no legacy global blob.
    ///
    /// # Errors
    /// - `MigrationError::StorageUnavailable` if the accessor cannot be reached
    pub async fn is_empty_store(&self) -> MigrationResult<bool> {
        if self.read(VERSION_MARKER_KEY).await?.is_some()
            || self.read(LEGACY_GLOBAL_KEY).await?.is_some()
        {
            return Ok(false);
        }
        Ok(self.user_ids().await?.is_empty())
    }

    async fn read(&self, key: &str) -> MigrationResult<Option<String>> {
        Ok(self.accessor.read_raw(key.to_string()).await?)
    }

    async fn write(&self, key: &str, value: Option<String>) -> MigrationResult<()> {
        Ok(self.accessor.write_raw(key.to_string(), value).await?)
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> MigrationResult<Option<T>> {
        match self.read(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn write_value(
        &self,
        physical_key: &str,
        key: &KeyDefinition,
        value: Option<Value>,
    ) -> MigrationResult<()> {
        // A JSON null is stored as a removal so a slot never holds a dead value.
        let value = value.filter(|value| !value.is_null());
        if let (Some(shape), Some(value)) = (key.shape(), value.as_ref()) {
            if !shape.matches(value) {
                crate::warn!(
                    "migration.unexpected_shape key={} expected={:?}",
                    physical_key,
                    shape
                );
            }
        }
        let raw = value.as_ref().map(serde_json::to_string).transpose()?;
        self.write(physical_key, raw).await
    }
}

fn dedup_preserving_order(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}
