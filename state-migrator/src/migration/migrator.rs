use async_trait::async_trait;

use crate::migration::error::MigrationResult;
use crate::migration::helper::MigrationHelper;

/// What a migration step touched
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StepOutcome {
    /// Records (accounts or the global blob) whose state was rewritten
    pub records_changed: u32,
    /// Records that had nothing to move
    pub records_unchanged: u32,
    /// Records skipped because they did not parse
    pub records_malformed: u32,
}

impl StepOutcome {
    /// Adds `other`'s counters to this outcome
    pub fn absorb(&mut self, other: Self) {
        self.records_changed = self.records_changed.saturating_add(other.records_changed);
        self.records_unchanged = self.records_unchanged.saturating_add(other.records_unchanged);
        self.records_malformed = self.records_malformed.saturating_add(other.records_malformed);
    }
}

/// One schema change: moves the store exactly one version forward, or back.
///
/// Migrators hold no mutable state; everything goes through the [`MigrationHelper`].
/// The runner only calls [`Migrator::migrate`] when the store is exactly at
/// [`Migrator::from_version`], and [`Migrator::rollback`] when it is exactly at
/// [`Migrator::to_version`], so implementations do not re-check the version.
///
/// Both directions must be safe to re-run after a crash: the version marker only advances
/// once a step has fully completed, so a half-applied step is replayed from the start.
#[async_trait]
pub trait Migrator: Send + Sync {
    /// The version this migrator upgrades from
    fn from_version(&self) -> u32;

    /// The version this migrator upgrades to; always `from_version() + 1`
    fn to_version(&self) -> u32 {
        self.from_version().saturating_add(1)
    }

    /// Short identifier used in logs
    fn name(&self) -> String {
        format!("migrator.{}-{}", self.from_version(), self.to_version())
    }

    /// Applies the forward schema change
    async fn migrate(&self, helper: &MigrationHelper) -> MigrationResult<StepOutcome>;

    /// Applies the exact structural inverse of [`Migrator::migrate`]
    async fn rollback(&self, helper: &MigrationHelper) -> MigrationResult<StepOutcome>;
}
