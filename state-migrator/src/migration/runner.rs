use std::sync::Arc;

use chrono::Utc;
use once_cell::sync::Lazy;
use tokio::sync::{Mutex, MutexGuard};

use crate::migration::error::{MigrationError, MigrationResult};
use crate::migration::helper::MigrationHelper;
use crate::migration::migrator::{Migrator, StepOutcome};
use crate::migration::migrators::default_migrators;
use crate::migration::registry::MigratorRegistry;
use crate::primitives::config::{current_migration_config, MigrationConfig};
use crate::primitives::storage::StorageAccessor;

/// Process-wide lock so that two runs never write the store at the same time, however many
/// [`MigrationRunner`] instances exist. Runs fail fast instead of queueing.
static MIGRATION_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Summary of a migration run
#[derive(Debug, Default, Clone, PartialEq, Eq, uniffi::Record)]
pub struct MigrationRunSummary {
    /// Version the store was at when the run started
    pub starting_version: u32,
    /// Version the store is at now
    pub final_version: u32,
    /// Number of migrators applied (forward or backward)
    pub steps_applied: u32,
    /// Records rewritten across all steps
    pub records_changed: u32,
    /// Records with nothing to move across all steps
    pub records_unchanged: u32,
    /// Records skipped as malformed across all steps
    pub records_malformed: u32,
}

impl MigrationRunSummary {
    const fn starting_at(version: u32) -> Self {
        Self {
            starting_version: version,
            final_version: version,
            steps_applied: 0,
            records_changed: 0,
            records_unchanged: 0,
            records_malformed: 0,
        }
    }

    fn record_step(&mut self, outcome: StepOutcome, version: u32) {
        self.final_version = version;
        self.steps_applied = self.steps_applied.saturating_add(1);
        self.records_changed = self.records_changed.saturating_add(outcome.records_changed);
        self.records_unchanged = self.records_unchanged.saturating_add(outcome.records_unchanged);
        self.records_malformed = self.records_malformed.saturating_add(outcome.records_malformed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

impl Direction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }
}

/// Moves the store along the version line by replaying registered migrators.
///
/// ## Version marker
///
/// The store's schema version lives under a reserved key and is written only after a step
/// has fully completed. If the app dies mid-step, the marker still names the last complete
/// version and the interrupted step is replayed from the start on the next run.
///
/// A store without a marker is at version 0, unless it holds no data at all, in which case
/// it is stamped with the target version without running anything.
///
/// ## Steps
///
/// Steps run strictly one after another. Within a step the migrator fans out over accounts
/// concurrently. A step that fails or exceeds the configured deadline stops the run and
/// leaves the marker at the last completed version.
///
/// ## Usage
///
/// The host calls `migrate_to_latest()` once at startup, before anything else reads the
/// store, and treats any error as fatal.
///
/// ```swift
/// let runner = try MigrationRunner(accessor: storage)
/// let summary = try await runner.migrateToLatest()
/// ```
#[derive(uniffi::Object)]
pub struct MigrationRunner {
    helper: MigrationHelper,
    registry: MigratorRegistry,
    config: MigrationConfig,
}

#[crate::state_export]
impl MigrationRunner {
    /// Creates a runner over `accessor` with the built-in migrators and the process-wide
    /// configuration.
    ///
    /// # Errors
    /// Returns `MigrationError::InvalidRegistry` or `UnknownMigratorVersion` if the built-in
    /// migrators do not form a chain.
    #[uniffi::constructor]
    pub fn new(accessor: Arc<dyn StorageAccessor>) -> Result<Arc<Self>, MigrationError> {
        let registry = MigratorRegistry::new(default_migrators())?;
        Ok(Self::with_registry(
            accessor,
            registry,
            current_migration_config(),
        ))
    }

    /// The highest version the registered migrators reach
    #[must_use]
    pub fn latest_version(&self) -> u32 {
        self.registry.latest_version()
    }

    /// The store's persisted version; 0 if it was never migrated
    ///
    /// # Errors
    /// Returns `MigrationError::StorageUnavailable` if the store cannot be reached.
    pub async fn current_version(&self) -> Result<u32, MigrationError> {
        Ok(self.helper.current_version().await?.unwrap_or(0))
    }

    /// Whether `migrate_to_latest` has anything to do
    ///
    /// # Errors
    /// Returns `MigrationError::StorageUnavailable` if the store cannot be reached.
    pub async fn needs_migration(&self) -> Result<bool, MigrationError> {
        let latest = self.registry.latest_version();
        Ok(self
            .helper
            .current_version()
            .await?
            .is_none_or(|version| version < latest))
    }

    /// Applies every migrator between the persisted version and the latest one
    ///
    /// # Errors
    ///
    /// - `MigrationError::InvalidOperation` if another run is in progress
    /// - `MigrationError::UnknownMigratorVersion` if the persisted version is not on the
    ///   chain; nothing is written
    /// - `MigrationError::StorageUnavailable` if the store cannot be reached
    /// - `MigrationError::StepFailure` if a step fails or times out; the marker stays at
    ///   the last completed version
    pub async fn migrate_to_latest(&self) -> Result<MigrationRunSummary, MigrationError> {
        let _guard = Self::acquire_run_lock()?;
        self.run_to(self.registry.latest_version()).await
    }

    /// Moves the store to `target`, forward through `migrate` or backward through repeated
    /// single-step rollbacks
    ///
    /// # Errors
    ///
    /// Same as [`Self::migrate_to_latest`]; additionally `UnknownMigratorVersion` if
    /// `target` is not on the chain.
    pub async fn migrate_to(&self, target: u32) -> Result<MigrationRunSummary, MigrationError> {
        let _guard = Self::acquire_run_lock()?;
        self.run_to(target).await
    }

    /// Rolls the store back by exactly one version
    ///
    /// # Errors
    ///
    /// - `MigrationError::InvalidOperation` if another run is in progress
    /// - `MigrationError::UnknownMigratorVersion` if no migrator ends at the persisted version
    /// - `MigrationError::StepFailure` if the rollback fails or times out; the marker is
    ///   unchanged
    pub async fn rollback_one_step(&self) -> Result<MigrationRunSummary, MigrationError> {
        let _guard = Self::acquire_run_lock()?;

        let current = self.helper.current_version().await?.unwrap_or(0);
        let migrator = self
            .registry
            .ending_at(current)
            .ok_or(MigrationError::UnknownMigratorVersion { version: current })?;

        let mut summary = MigrationRunSummary::starting_at(current);
        let outcome = self
            .apply_step(migrator.as_ref(), Direction::Backward)
            .await?;
        summary.record_step(outcome, migrator.from_version());
        Ok(summary)
    }
}

impl MigrationRunner {
    /// Creates a runner with an explicit registry and configuration
    #[must_use]
    pub fn with_registry(
        accessor: Arc<dyn StorageAccessor>,
        registry: MigratorRegistry,
        config: MigrationConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            helper: MigrationHelper::new(accessor, config),
            registry,
            config,
        })
    }

    fn acquire_run_lock() -> MigrationResult<MutexGuard<'static, ()>> {
        MIGRATION_LOCK.try_lock().map_err(|_| MigrationError::InvalidOperation {
            message: "Migration is already in progress. Please wait for the current migration to complete.".to_string(),
        })
    }

    async fn run_to(&self, target: u32) -> MigrationResult<MigrationRunSummary> {
        self.registry.ensure_supported(target)?;
        let run_start_time = Utc::now();

        let current = match self.helper.current_version().await? {
            Some(version) => version,
            None if self.helper.is_empty_store().await? => {
                self.helper.set_current_version(target).await?;
                crate::info!(
                    "migration_run.fresh_store stamped_version={} timestamp={}",
                    target,
                    Utc::now().to_rfc3339()
                );
                return Ok(MigrationRunSummary {
                    starting_version: 0,
                    ..MigrationRunSummary::starting_at(target)
                });
            }
            None => 0,
        };
        self.registry.ensure_supported(current)?;

        crate::info!(
            "migration_run.started current_version={} target_version={} timestamp={}",
            current,
            target,
            run_start_time.to_rfc3339()
        );

        let mut summary = MigrationRunSummary::starting_at(current);
        if current <= target {
            for migrator in self.registry.forward_path(current, target) {
                let outcome = self
                    .apply_step(migrator.as_ref(), Direction::Forward)
                    .await?;
                summary.record_step(outcome, migrator.to_version());
            }
        } else {
            let mut version = current;
            while version > target {
                let migrator = self
                    .registry
                    .ending_at(version)
                    .ok_or(MigrationError::UnknownMigratorVersion { version })?;
                let outcome = self
                    .apply_step(migrator.as_ref(), Direction::Backward)
                    .await?;
                version = migrator.from_version();
                summary.record_step(outcome, version);
            }
        }

        crate::info!(
            "migration_run.completed starting_version={} final_version={} steps={} changed={} unchanged={} malformed={} duration_ms={} timestamp={}",
            summary.starting_version,
            summary.final_version,
            summary.steps_applied,
            summary.records_changed,
            summary.records_unchanged,
            summary.records_malformed,
            (Utc::now() - run_start_time).num_milliseconds(),
            Utc::now().to_rfc3339()
        );

        Ok(summary)
    }

    /// Runs one migrator in `direction` under the step deadline and, only if it completed,
    /// persists the new version.
    async fn apply_step(
        &self,
        migrator: &dyn Migrator,
        direction: Direction,
    ) -> MigrationResult<StepOutcome> {
        let (from, to) = (migrator.from_version(), migrator.to_version());
        let name = migrator.name();
        let new_version = match direction {
            Direction::Forward => to,
            Direction::Backward => from,
        };

        crate::info!(
            "migration.step_started name={} direction={} from={} to={} timestamp={}",
            name,
            direction.as_str(),
            from,
            to,
            Utc::now().to_rfc3339()
        );
        let step_start = Utc::now();

        let pending = match direction {
            Direction::Forward => migrator.migrate(&self.helper),
            Direction::Backward => migrator.rollback(&self.helper),
        };
        let result = tokio::time::timeout(self.config.step_timeout(), pending)
            .await
            .unwrap_or_else(|_| {
                Err(MigrationError::StepFailure {
                    from,
                    to,
                    message: format!("timed out after {} ms", self.config.step_timeout_ms),
                })
            });
        let duration_ms = (Utc::now() - step_start).num_milliseconds();

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                crate::error!(
                    "migration.step_failed name={} direction={} from={} to={} duration_ms={} error={} timestamp={}",
                    name,
                    direction.as_str(),
                    from,
                    to,
                    duration_ms,
                    e,
                    Utc::now().to_rfc3339()
                );
                return Err(match e {
                    fatal if fatal.is_fatal() => fatal,
                    step @ MigrationError::StepFailure { .. } => step,
                    other => MigrationError::StepFailure {
                        from,
                        to,
                        message: other.to_string(),
                    },
                });
            }
        };

        self.helper.set_current_version(new_version).await?;

        crate::info!(
            "migration.step_succeeded name={} direction={} version={} changed={} unchanged={} malformed={} duration_ms={} timestamp={}",
            name,
            direction.as_str(),
            new_version,
            outcome.records_changed,
            outcome.records_unchanged,
            outcome.records_malformed,
            duration_ms,
            Utc::now().to_rfc3339()
        );

        Ok(outcome)
    }
}
