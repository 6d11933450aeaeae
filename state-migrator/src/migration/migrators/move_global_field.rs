use async_trait::async_trait;
use serde_json::Value;

use crate::migration::error::{MigrationError, MigrationResult};
use crate::migration::helper::MigrationHelper;
use crate::migration::migrator::{Migrator, StepOutcome};
use crate::state::{AccountRecord, KeyDefinition};

/// Moves one field of the legacy global blob into a global slot.
///
/// The global counterpart of
/// [`MoveAccountFieldMigrator`](super::MoveAccountFieldMigrator), with the same policy:
/// absent fields are a no-op, rollback overwrites, and a missing blob is recreated on
/// rollback. A global blob that is not a JSON object is skipped with a warning.
#[derive(Debug, Clone)]
pub struct MoveGlobalFieldMigrator {
    from: u32,
    legacy_path: String,
    target: KeyDefinition,
}

const fn outcome(changed: u32, unchanged: u32, malformed: u32) -> StepOutcome {
    StepOutcome {
        records_changed: changed,
        records_unchanged: unchanged,
        records_malformed: malformed,
    }
}

impl MoveGlobalFieldMigrator {
    /// Moves `legacy_path` (dotted) of the global blob into `target` when upgrading from
    /// version `from`
    #[must_use]
    pub fn new(from: u32, legacy_path: impl Into<String>, target: KeyDefinition) -> Self {
        Self {
            from,
            legacy_path: legacy_path.into(),
            target,
        }
    }

    async fn legacy_record(
        &self,
        helper: &MigrationHelper,
    ) -> MigrationResult<Result<Option<AccountRecord>, StepOutcome>> {
        match helper.get_legacy_global().await {
            Ok(record) => Ok(Ok(record)),
            Err(MigrationError::MalformedAccountRecord { message, .. }) => {
                crate::warn!(
                    "migration.global_malformed step={} error={}",
                    self.name(),
                    message
                );
                Ok(Err(outcome(0, 0, 1)))
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Migrator for MoveGlobalFieldMigrator {
    fn from_version(&self) -> u32 {
        self.from
    }

    fn name(&self) -> String {
        format!(
            "move_global_field.{}-{}.{}",
            self.from,
            self.to_version(),
            self.legacy_path
        )
    }

    async fn migrate(&self, helper: &MigrationHelper) -> MigrationResult<StepOutcome> {
        let mut record = match self.legacy_record(helper).await? {
            Ok(Some(record)) => record,
            Ok(None) => return Ok(outcome(0, 1, 0)),
            Err(skipped) => return Ok(skipped),
        };
        let Some(value) = record.take_path(&self.legacy_path) else {
            return Ok(outcome(0, 1, 0));
        };

        helper.set_global(&self.target, Some(value)).await?;
        helper.set_legacy_global(&record).await?;
        Ok(outcome(1, 0, 0))
    }

    async fn rollback(&self, helper: &MigrationHelper) -> MigrationResult<StepOutcome> {
        let value = helper
            .get::<Value>(&self.target)
            .await?
            .filter(|value| !value.is_null());
        let Some(value) = value else {
            return Ok(outcome(0, 1, 0));
        };

        let mut record = match self.legacy_record(helper).await? {
            Ok(record) => record.unwrap_or_default(),
            Err(skipped) => return Ok(skipped),
        };
        if let Err(conflict) = record.insert_path(&self.legacy_path, value) {
            crate::warn!(
                "migration.global_malformed step={} error={}",
                self.name(),
                conflict
            );
            return Ok(outcome(0, 0, 1));
        }

        helper.set_legacy_global(&record).await?;
        helper.set_global(&self.target, None).await?;
        Ok(outcome(1, 0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::config::MigrationConfig;
    use crate::primitives::storage::InMemoryStorageAccessor;
    use crate::state::{StateDefinition, LEGACY_GLOBAL_KEY};
    use serde_json::json;
    use std::sync::Arc;

    fn theme_migrator() -> MoveGlobalFieldMigrator {
        MoveGlobalFieldMigrator::new(
            23,
            "theme",
            KeyDefinition::new(StateDefinition::new("theming"), "selection"),
        )
    }

    fn setup(entries: Vec<(&str, Value)>) -> (Arc<InMemoryStorageAccessor>, MigrationHelper) {
        let store = Arc::new(InMemoryStorageAccessor::with_entries(entries));
        let helper = MigrationHelper::new(store.clone(), MigrationConfig::default());
        (store, helper)
    }

    #[tokio::test]
    async fn test_migrate_and_rollback_round_trip() {
        let original = json!({"theme": "dark", "locale": "en"});
        let (store, helper) = setup(vec![(LEGACY_GLOBAL_KEY, original.clone())]);
        let migrator = theme_migrator();

        let forward = migrator.migrate(&helper).await.unwrap();
        assert_eq!(forward.records_changed, 1);
        assert_eq!(store.json(LEGACY_GLOBAL_KEY), Some(json!({"locale": "en"})));
        assert_eq!(store.json("global_theming_selection"), Some(json!("dark")));

        let backward = migrator.rollback(&helper).await.unwrap();
        assert_eq!(backward.records_changed, 1);
        assert_eq!(store.json(LEGACY_GLOBAL_KEY), Some(original));
        assert_eq!(store.raw("global_theming_selection"), None);
    }

    #[tokio::test]
    async fn test_missing_global_blob_is_a_no_op() {
        let (store, helper) = setup(vec![]);

        let forward = theme_migrator().migrate(&helper).await.unwrap();
        assert_eq!(forward, outcome(0, 1, 0));
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_rollback_recreates_missing_global_blob() {
        let (store, helper) = setup(vec![("global_theming_selection", json!("light"))]);

        theme_migrator().rollback(&helper).await.unwrap();

        assert_eq!(store.json(LEGACY_GLOBAL_KEY), Some(json!({"theme": "light"})));
        assert_eq!(store.raw("global_theming_selection"), None);
    }

    #[tokio::test]
    async fn test_rollback_replaces_null_global_blob() {
        let (store, helper) = setup(vec![
            (LEGACY_GLOBAL_KEY, Value::Null),
            ("global_theming_selection", json!("light")),
        ]);

        let backward = theme_migrator().rollback(&helper).await.unwrap();

        assert_eq!(backward, outcome(1, 0, 0));
        assert_eq!(store.json(LEGACY_GLOBAL_KEY), Some(json!({"theme": "light"})));
        assert_eq!(store.raw("global_theming_selection"), None);
    }

    #[tokio::test]
    async fn test_malformed_global_blob_is_skipped() {
        let (store, helper) = setup(vec![(LEGACY_GLOBAL_KEY, json!(["not", "an", "object"]))]);

        let forward = theme_migrator().migrate(&helper).await.unwrap();
        assert_eq!(forward, outcome(0, 0, 1));
        assert_eq!(store.json(LEGACY_GLOBAL_KEY), Some(json!(["not", "an", "object"])));
    }
}
