use std::sync::OnceLock;
use std::time::Duration;

/// Process-wide migration configuration
static CONFIG_INSTANCE: OnceLock<MigrationConfig> = OnceLock::new();

const DEFAULT_STEP_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAX_CONCURRENT_ACCOUNTS: u32 = 16;

/// Tuning for a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Record)]
pub struct MigrationConfig {
    /// Deadline for a single migration step, in milliseconds. A step that exceeds it fails
    /// and the version marker is left unchanged.
    pub step_timeout_ms: u64,
    /// Upper bound on per-account tasks in flight within one step. `0` is treated as `1`.
    pub max_concurrent_accounts: u32,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            step_timeout_ms: DEFAULT_STEP_TIMEOUT_MS,
            max_concurrent_accounts: DEFAULT_MAX_CONCURRENT_ACCOUNTS,
        }
    }
}

impl MigrationConfig {
    /// The per-step deadline as a [`Duration`]
    #[must_use]
    pub const fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    /// Number of per-account tasks allowed in flight, never less than one
    #[must_use]
    pub fn account_concurrency(&self) -> usize {
        usize::try_from(self.max_concurrent_accounts.max(1)).unwrap_or(usize::MAX)
    }
}

/// Initializes the process-wide migration configuration.
///
/// Call once at application start, before constructing a `MigrationRunner`.
/// Subsequent calls are ignored with a warning.
///
/// # Examples
///
/// ## Kotlin
///
/// ```kotlin
/// initMigrationConfig(MigrationConfig(stepTimeoutMs = 60_000u, maxConcurrentAccounts = 8u))
/// ```
#[uniffi::export]
pub fn init_migration_config(config: MigrationConfig) {
    match CONFIG_INSTANCE.set(config) {
        Ok(()) => {
            crate::info!(
                "migration_config.initialized step_timeout_ms={} max_concurrent_accounts={}",
                config.step_timeout_ms,
                config.max_concurrent_accounts
            );
        }
        Err(_) => {
            crate::warn!("migration_config.already_initialized ignoring");
        }
    }
}

/// Returns the process-wide configuration, or the defaults if it was never initialized.
#[must_use]
#[uniffi::export]
pub fn current_migration_config() -> MigrationConfig {
    CONFIG_INSTANCE.get().copied().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MigrationConfig::default();
        assert_eq!(config.step_timeout(), Duration::from_secs(30));
        assert_eq!(config.account_concurrency(), 16);
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        let config = MigrationConfig {
            step_timeout_ms: 10,
            max_concurrent_accounts: 0,
        };
        assert_eq!(config.account_concurrency(), 1);
    }

    #[test]
    fn test_first_initialization_wins() {
        let first = MigrationConfig {
            step_timeout_ms: 1_234,
            max_concurrent_accounts: 2,
        };
        init_migration_config(first);
        init_migration_config(MigrationConfig::default());

        assert_eq!(current_migration_config(), first);
    }
}
