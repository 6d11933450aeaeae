use async_trait::async_trait;
use serde_json::Value;

use crate::migration::error::{MigrationError, MigrationResult};
use crate::migration::helper::MigrationHelper;
use crate::migration::migrator::{Migrator, StepOutcome};
use crate::migration::task_group::AccountChange;
use crate::state::{AccountRecord, KeyDefinition};

/// Moves one field out of every legacy account blob into a per-user slot.
///
/// Forward, per account: if the field at `legacy_path` holds a live (non-null) value, the
/// value is written to the user's `target` slot, then the field is removed from the blob
/// and the blob is persisted. Accounts without the field are left untouched.
///
/// Rollback, per account: if the user's `target` slot holds a value, it is written back at
/// `legacy_path` (overwriting whatever is there), the blob is persisted and the slot is
/// cleared. An account with no blob (or a `null` one) gets an empty one so the value is
/// never lost, including users that only survive as a populated slot.
///
/// In both directions the destination is written before the source is cleared, so a crash
/// in between leaves the value in both places and a replay converges.
#[derive(Debug, Clone)]
pub struct MoveAccountFieldMigrator {
    from: u32,
    legacy_path: String,
    target: KeyDefinition,
}

impl MoveAccountFieldMigrator {
    /// Moves `legacy_path` (dotted) into `target` when upgrading from version `from`
    #[must_use]
    pub fn new(from: u32, legacy_path: impl Into<String>, target: KeyDefinition) -> Self {
        Self {
            from,
            legacy_path: legacy_path.into(),
            target,
        }
    }

    async fn migrate_account(
        &self,
        helper: &MigrationHelper,
        user_id: String,
    ) -> MigrationResult<AccountChange> {
        let Some(mut account) = helper.get_account::<AccountRecord>(&user_id).await? else {
            return Ok(AccountChange::Unchanged);
        };
        let Some(value) = account.take_path(&self.legacy_path) else {
            return Ok(AccountChange::Unchanged);
        };

        helper.set_to_user(&user_id, &self.target, Some(value)).await?;
        helper.set(&user_id, &account).await?;
        Ok(AccountChange::Changed)
    }

    async fn rollback_account(
        &self,
        helper: &MigrationHelper,
        user_id: String,
    ) -> MigrationResult<AccountChange> {
        let value = helper
            .get_from_user::<Value>(&user_id, &self.target)
            .await?
            .filter(|value| !value.is_null());
        let Some(value) = value else {
            return Ok(AccountChange::Unchanged);
        };

        let mut account = match helper.get_account::<AccountRecord>(&user_id).await? {
            Some(account) => account,
            None => {
                crate::info!(
                    "migration.account_shell_created user_id={} field={}",
                    user_id,
                    self.legacy_path
                );
                AccountRecord::new()
            }
        };

        let previous = account
            .insert_path(&self.legacy_path, value)
            .map_err(|e| MigrationError::MalformedAccountRecord {
                user_id: user_id.clone(),
                message: e.to_string(),
            })?;
        if previous.is_some_and(|previous| !previous.is_null()) {
            crate::debug!(
                "migration.rollback_overwrote user_id={} field={}",
                user_id,
                self.legacy_path
            );
        }

        helper.set(&user_id, &account).await?;
        helper.set_to_user(&user_id, &self.target, None).await?;
        Ok(AccountChange::Changed)
    }
}

#[async_trait]
impl Migrator for MoveAccountFieldMigrator {
    fn from_version(&self) -> u32 {
        self.from
    }

    fn name(&self) -> String {
        format!(
            "move_account_field.{}-{}.{}",
            self.from,
            self.to_version(),
            self.legacy_path
        )
    }

    async fn migrate(&self, helper: &MigrationHelper) -> MigrationResult<StepOutcome> {
        let user_ids = helper.user_ids().await?;
        helper
            .account_task_group(self.name())
            .run(user_ids, |user_id| self.migrate_account(helper, user_id))
            .await
    }

    async fn rollback(&self, helper: &MigrationHelper) -> MigrationResult<StepOutcome> {
        let user_ids = helper.user_ids_for_rollback(&self.target).await?;
        helper
            .account_task_group(self.name())
            .run(user_ids, |user_id| self.rollback_account(helper, user_id))
            .await
    }
}
