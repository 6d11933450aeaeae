//! Migration System
//!
//! Versioned, reversible schema migrations for a key-value store holding per-account and
//! global application state.
//!
//! # Overview
//!
//! The migration system consists of:
//! - [`MigrationRunner`]: Resolves the store's version and applies migrators in order
//! - [`Migrator`]: Trait for implementing one schema change and its exact inverse
//! - [`MigratorRegistry`]: The validated, gap-free chain of migrators
//! - [`MigrationHelper`]: Typed access to legacy blobs, key-addressed slots and the version
//!   marker, shared by every migrator
//! - [`AccountTaskGroup`]: Bounded per-account fan-out with failure isolation
//!
//! The store's version lives under the reserved `stateVersion` key and only advances after
//! a step has fully completed.
//!
//! # Usage
//!
//! ## Platform Usage (Swift/Kotlin)
//!
//! ```swift
//! // 1. Optionally tune the run
//! initMigrationConfig(config: MigrationConfig(stepTimeoutMs: 30_000, maxConcurrentAccounts: 16))
//!
//! // 2. Create the runner over the platform storage
//! let runner = try MigrationRunner(accessor: storage)
//!
//! // 3. Migrate before anything else reads the store
//! let summary = try await runner.migrateToLatest()
//! ```
//!
//! ```kotlin
//! val runner = MigrationRunner(storage)
//! val summary = runner.migrateToLatest()
//! ```
//!
//! ## Adding New Migrations
//!
//! 1. **Field moves** need no new type: add a [`migrators::MoveAccountFieldMigrator`] or
//!    [`migrators::MoveGlobalFieldMigrator`] to `migrators::default_migrators()` with the next
//!    source version.
//!
//! 2. **Anything else** implements [`Migrator`]. Use [`MigrationHelper::account_task_group`]
//!    to process accounts, and make both directions safe to replay:
//!
//!    ```rust,ignore
//!    async fn migrate(&self, helper: &MigrationHelper) -> MigrationResult<StepOutcome> {
//!        let user_ids = helper.user_ids().await?;
//!        helper
//!            .account_task_group(self.name())
//!            .run(user_ids, |user_id| self.migrate_account(helper, user_id))
//!            .await
//!    }
//!    ```
//!
//! Registering a migrator that skips or repeats a version fails at construction.
//!
//! # Crash Safety
//!
//! Every move writes its destination before clearing its source. A crash mid-step leaves the
//! value in both places and the marker at the previous version, so the step is replayed and
//! converges.

mod error;
mod helper;
mod migrator;
mod registry;
mod runner;
mod task_group;

/// Built-in migrators
pub mod migrators;

// Public API exports
pub use error::{MigrationError, MigrationResult};
pub use helper::{AccountEntry, MigrationHelper};
pub use migrator::{Migrator, StepOutcome};
pub use registry::MigratorRegistry;
pub use runner::{MigrationRunSummary, MigrationRunner};
pub use task_group::{AccountChange, AccountTaskGroup};
