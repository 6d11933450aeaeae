//! Moving `localData` out of the account blobs (22 -> 23) and back.

use std::sync::Arc;

use serde_json::json;
use serial_test::serial;

use state_migrator::migration::{MigrationError, MigrationRunSummary};
use state_migrator::primitives::storage::InMemoryStorageAccessor;
use state_migrator::state::VERSION_MARKER_KEY;

mod common;
use common::{default_runner, seeded_store};

#[tokio::test]
#[serial]
async fn test_local_data_moves_to_slot_and_back() -> anyhow::Result<()> {
    let store = seeded_store(
        22,
        &[
            ("u1", json!({"localData": {"c1": {"lastUsed": 5}}, "profile": {}})),
            ("u2", json!({"profile": {}})),
        ],
        None,
    );
    let original = store.snapshot();
    let runner = default_runner(&store);

    let summary = runner.migrate_to(23).await?;

    assert_eq!(
        summary,
        MigrationRunSummary {
            starting_version: 22,
            final_version: 23,
            steps_applied: 1,
            records_changed: 1,
            records_unchanged: 1,
            records_malformed: 0,
        }
    );
    assert_eq!(store.json("u1"), Some(json!({"profile": {}})));
    assert_eq!(
        store.json("user_u1_localData_ciphers"),
        Some(json!({"c1": {"lastUsed": 5}}))
    );
    assert_eq!(store.json("u2"), Some(json!({"profile": {}})));
    assert_eq!(store.raw("user_u2_localData_ciphers"), None);
    assert_eq!(store.json(VERSION_MARKER_KEY), Some(json!(23)));

    let rolled_back = runner.rollback_one_step().await?;

    assert_eq!(rolled_back.final_version, 22);
    assert_eq!(store.snapshot(), original);
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_malformed_account_is_skipped_without_blocking_others() -> anyhow::Result<()> {
    let store = seeded_store(
        22,
        &[
            ("u1", json!({"localData": {"c1": {}}})),
            ("u2", json!(["not", "an", "account"])),
            ("u3", json!({"localData": {"c3": {}}})),
        ],
        None,
    );
    let runner = default_runner(&store);

    let summary = runner.migrate_to(23).await?;

    assert_eq!(summary.records_changed, 2);
    assert_eq!(summary.records_malformed, 1);
    assert_eq!(store.json("u2"), Some(json!(["not", "an", "account"])));
    assert_eq!(store.json("user_u1_localData_ciphers"), Some(json!({"c1": {}})));
    assert_eq!(store.json("user_u3_localData_ciphers"), Some(json!({"c3": {}})));
    assert_eq!(runner.current_version().await?, 23);
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_failed_account_write_keeps_version_and_loses_nothing() -> anyhow::Result<()> {
    let store = seeded_store(
        22,
        &[
            ("u1", json!({"localData": {"c1": {}}})),
            ("u2", json!({"localData": {"c2": {}}})),
        ],
        None,
    );
    store.fail_writes_for("u2");
    let runner = default_runner(&store);

    let err = runner.migrate_to(23).await.unwrap_err();

    assert!(matches!(err, MigrationError::StepFailure { from: 22, to: 23, .. }));
    assert_eq!(runner.current_version().await?, 22);
    // u1 finished its move; u2 still holds its value in the blob and, since the slot is
    // written first, in the slot as well
    assert_eq!(store.json("u1"), Some(json!({})));
    assert_eq!(store.json("user_u1_localData_ciphers"), Some(json!({"c1": {}})));
    assert_eq!(store.json("u2"), Some(json!({"localData": {"c2": {}}})));
    assert_eq!(store.json("user_u2_localData_ciphers"), Some(json!({"c2": {}})));
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_accounts_found_by_key_listing_without_index() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStorageAccessor::with_entries([
        (VERSION_MARKER_KEY, json!(22)),
        ("u9", json!({"localData": {"c9": {}}})),
        ("global_theming_selection", json!("dark")),
    ]));
    let runner = default_runner(&store);

    let summary = runner.migrate_to(23).await?;

    assert_eq!(summary.records_changed, 1);
    assert_eq!(store.json("u9"), Some(json!({})));
    assert_eq!(store.json("user_u9_localData_ciphers"), Some(json!({"c9": {}})));
    assert_eq!(store.json("global_theming_selection"), Some(json!("dark")));
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_rollback_restores_account_known_only_by_its_slot() -> anyhow::Result<()> {
    let store = Arc::new(InMemoryStorageAccessor::with_entries([
        (VERSION_MARKER_KEY, json!(23)),
        ("user_u3_localData_ciphers", json!({"c1": {"lastUsedDate": 100}})),
    ]));
    let runner = default_runner(&store);

    let summary = runner.rollback_one_step().await?;

    assert_eq!(summary.final_version, 22);
    assert_eq!(summary.records_changed, 1);
    assert_eq!(
        store.json("u3"),
        Some(json!({"localData": {"c1": {"lastUsedDate": 100}}}))
    );
    assert_eq!(store.raw("user_u3_localData_ciphers"), None);
    assert_eq!(store.json(VERSION_MARKER_KEY), Some(json!(22)));
    Ok(())
}

#[tokio::test]
#[serial]
async fn test_rollback_replaces_null_account_record() -> anyhow::Result<()> {
    let store = seeded_store(23, &[("u3", serde_json::Value::Null)], None);
    store.insert_json("user_u3_localData_ciphers", &json!({"c1": {"lastUsedDate": 100}}));
    let runner = default_runner(&store);

    let summary = runner.rollback_one_step().await?;

    assert_eq!(summary.final_version, 22);
    assert_eq!(summary.records_malformed, 0);
    assert_eq!(
        store.json("u3"),
        Some(json!({"localData": {"c1": {"lastUsedDate": 100}}}))
    );
    assert_eq!(store.raw("user_u3_localData_ciphers"), None);
    Ok(())
}
