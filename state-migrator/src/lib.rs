#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    dead_code
)]

//! `state_migrator` advances a persisted per-account key-value store from one schema
//! version to the next by replaying an ordered chain of migrators, and can roll a single
//! step back.
//!
//! The store itself lives on the host (disk, platform preferences, memory) and is reached
//! through the [`primitives::storage::StorageAccessor`] foreign trait.

/// Low level building blocks: storage access, logging and configuration.
pub mod primitives;

/// Logical addressing of state (namespaces and keys) and the legacy account record.
pub mod state;

/// The versioned migration engine: helper, migrator contract, registry and runner.
pub mod migration;

pub use state_migrator_macros::{state_error, state_export};

uniffi::setup_scaffolding!("state_migrator");
