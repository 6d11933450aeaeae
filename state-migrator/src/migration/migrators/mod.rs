//! Migrator implementations and the default registry contents.
//!
//! Most schema changes move one field out of the legacy blobs into a key-addressed slot,
//! so they are expressed as data: a source version, a dotted legacy path and a target
//! [`KeyDefinition`].

mod move_account_field;
mod move_global_field;

pub use move_account_field::MoveAccountFieldMigrator;
pub use move_global_field::MoveGlobalFieldMigrator;

use std::sync::Arc;

use crate::migration::migrator::Migrator;
use crate::state::{KeyDefinition, StateDefinition, ValueShape};

/// `crypto/pinKeyEncryptedUserKey`, per user
#[must_use]
pub fn pin_key_encrypted_user_key() -> KeyDefinition {
    KeyDefinition::new(StateDefinition::new("crypto"), "pinKeyEncryptedUserKey")
        .with_shape(ValueShape::String)
}

/// `crypto/masterKeyEncryptedUserKey`, per user
#[must_use]
pub fn master_key_encrypted_user_key() -> KeyDefinition {
    KeyDefinition::new(StateDefinition::new("crypto"), "masterKeyEncryptedUserKey")
        .with_shape(ValueShape::String)
}

/// `localData/ciphers`, per user: cached per-cipher usage data
#[must_use]
pub fn local_data_ciphers() -> KeyDefinition {
    KeyDefinition::new(StateDefinition::new("localData"), "ciphers").with_shape(ValueShape::Object)
}

/// `theming/selection`, global
#[must_use]
pub fn theme_selection() -> KeyDefinition {
    KeyDefinition::new(StateDefinition::new("theming"), "selection")
        .with_shape(ValueShape::String)
}

/// The migrators shipped with this crate, oldest first.
///
/// | step     | moves                                   | to                                |
/// |----------|-----------------------------------------|-----------------------------------|
/// | 20 -> 21 | `settings.pinKeyEncryptedUserKey`       | `crypto/pinKeyEncryptedUserKey`   |
/// | 21 -> 22 | `keys.masterKeyEncryptedUserKey`        | `crypto/masterKeyEncryptedUserKey`|
/// | 22 -> 23 | `localData`                             | `localData/ciphers`               |
/// | 23 -> 24 | `theme` of the legacy global blob       | `theming/selection` (global)      |
#[must_use]
pub fn default_migrators() -> Vec<Arc<dyn Migrator>> {
    vec![
        Arc::new(MoveAccountFieldMigrator::new(
            20,
            "settings.pinKeyEncryptedUserKey",
            pin_key_encrypted_user_key(),
        )),
        Arc::new(MoveAccountFieldMigrator::new(
            21,
            "keys.masterKeyEncryptedUserKey",
            master_key_encrypted_user_key(),
        )),
        Arc::new(MoveAccountFieldMigrator::new(
            22,
            "localData",
            local_data_ciphers(),
        )),
        Arc::new(MoveGlobalFieldMigrator::new(23, "theme", theme_selection())),
    ]
}
