//! Logical addressing of persisted state.
//!
//! Migrators never build physical keys by hand. They name a [`StateDefinition`]
//! (a namespace such as `crypto` or `localData`) and a [`KeyDefinition`] inside it, and the
//! [`MigrationHelper`](crate::migration::MigrationHelper) materializes the physical key:
//!
//! | scope  | physical key                          |
//! |--------|---------------------------------------|
//! | user   | `user_<userId>_<stateName>_<key>`     |
//! | global | `global_<stateName>_<key>`            |
//!
//! Alongside those, the store holds a few reserved keys: the version marker
//! ([`VERSION_MARKER_KEY`]), the account index ([`ACCOUNT_INDEX_KEY`]), the legacy global
//! blob ([`LEGACY_GLOBAL_KEY`]) and one legacy [`AccountRecord`] per user id.

mod account;
mod definition;

pub use account::{AccountRecord, PathConflict};
pub use definition::{KeyDefinition, KeyScope, StateDefinition, ValueShape};

/// Physical key of the version marker. Its value is a single JSON integer.
pub const VERSION_MARKER_KEY: &str = "stateVersion";

/// Physical key of the account index, a JSON array of user ids written by the application.
pub const ACCOUNT_INDEX_KEY: &str = "authenticatedAccounts";

/// Physical key of the legacy global blob.
pub const LEGACY_GLOBAL_KEY: &str = "global";

/// Prefix of every user-scoped, key-addressed slot.
pub const USER_KEY_PREFIX: &str = "user_";

/// Prefix of every global, key-addressed slot.
pub const GLOBAL_KEY_PREFIX: &str = "global_";

/// Whether `key` is a top-level key that can hold a legacy account record, i.e. it is not
/// reserved and not a key-addressed slot.
#[must_use]
pub fn is_account_record_key(key: &str) -> bool {
    !key.is_empty()
        && key != VERSION_MARKER_KEY
        && key != ACCOUNT_INDEX_KEY
        && key != LEGACY_GLOBAL_KEY
        && !key.starts_with(USER_KEY_PREFIX)
        && !key.starts_with(GLOBAL_KEY_PREFIX)
}
