//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Value};

use state_migrator::migration::MigrationRunner;
use state_migrator::primitives::storage::{InMemoryStorageAccessor, StorageAccessor};
use state_migrator::state::{ACCOUNT_INDEX_KEY, LEGACY_GLOBAL_KEY, VERSION_MARKER_KEY};

/// A store at `version` holding `accounts` (indexed in the given order) and, if present, a
/// legacy global blob.
pub fn seeded_store(
    version: u32,
    accounts: &[(&str, Value)],
    global: Option<Value>,
) -> Arc<InMemoryStorageAccessor> {
    let store = InMemoryStorageAccessor::new();
    store.insert_json(VERSION_MARKER_KEY, &json!(version));
    let ids: Vec<&str> = accounts.iter().map(|(id, _)| *id).collect();
    store.insert_json(ACCOUNT_INDEX_KEY, &json!(ids));
    for (id, blob) in accounts {
        store.insert_json(*id, blob);
    }
    if let Some(global) = global {
        store.insert_json(LEGACY_GLOBAL_KEY, &global);
    }
    Arc::new(store)
}

/// An account blob as it looked at version 20, before any field moved out of it
pub fn legacy_account(pin: &str, master: &str) -> Value {
    json!({
        "profile": {"email": format!("{pin}@example.com")},
        "settings": {"pinKeyEncryptedUserKey": pin, "vaultTimeout": 15},
        "keys": {"masterKeyEncryptedUserKey": master, "privateKey": "2.priv"},
        "localData": {"cipher-1": {"lastUsedDate": 1_700_000_000}},
    })
}

/// A runner with the built-in migrators over `store`
pub fn default_runner(store: &Arc<InMemoryStorageAccessor>) -> Arc<MigrationRunner> {
    let accessor: Arc<dyn StorageAccessor> = store.clone();
    MigrationRunner::new(accessor).expect("built-in migrators form a chain")
}
