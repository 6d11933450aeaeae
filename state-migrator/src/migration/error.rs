use crate::primitives::storage::StorageError;

/// Errors that can occur during migration operations
#[crate::state_error]
pub enum MigrationError {
    /// The storage accessor cannot be reached. Fatal for the whole run.
    #[error("storage unavailable: {message}")]
    StorageUnavailable {
        /// Reason reported by the accessor
        message: String,
    },

    /// An account blob does not parse as the shape a migrator expects. The account is
    /// skipped with a warning; sibling accounts still migrate.
    #[error("malformed account record for {user_id}: {message}")]
    MalformedAccountRecord {
        /// The account whose blob is malformed
        user_id: String,
        /// Why the blob was rejected
        message: String,
    },

    /// One or more per-account tasks of a step failed in a way that risks data loss
    #[error("{failed} of {total} account task(s) failed: {message}")]
    AccountTasksFailed {
        /// Number of failed tasks
        failed: u32,
        /// Number of tasks in the step
        total: u32,
        /// The failures, one per account
        message: String,
    },

    /// A migration step did not complete; the version marker was not advanced
    #[error("migration step {from} -> {to} failed: {message}")]
    StepFailure {
        /// Source version of the failing migrator
        from: u32,
        /// Target version of the failing migrator
        to: u32,
        /// The underlying cause
        message: String,
    },

    /// No registered migrator covers `version`
    #[error("no migrator covers version {version}")]
    UnknownMigratorVersion {
        /// The uncovered version
        version: u32,
    },

    /// The migrator list cannot form a linear chain
    #[error("invalid migrator registry: {message}")]
    InvalidRegistry {
        /// What is wrong with the list
        message: String,
    },

    /// An invalid operation was attempted
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// What was attempted
        message: String,
    },

    /// A storage operation failed while the backend was reachable
    #[error(transparent)]
    Storage(StorageError),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {message}")]
    JsonError {
        /// The error message from `serde_json`
        message: String,
    },
}

impl From<StorageError> for MigrationError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Unavailable { message } => Self::StorageUnavailable { message },
            other => Self::Storage(other),
        }
    }
}

impl From<serde_json::Error> for MigrationError {
    fn from(e: serde_json::Error) -> Self {
        Self::JsonError {
            message: e.to_string(),
        }
    }
}

impl MigrationError {
    /// Whether this error aborts the whole run rather than a single account
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. })
    }
}

/// Result type for migration operations
pub type MigrationResult<T> = std::result::Result<T, MigrationError>;
