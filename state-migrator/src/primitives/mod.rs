/// Raw access to the host's persisted key-value store.
pub mod storage;

/// Logging that forwards to a host-provided logger.
pub mod logger;

/// Process-wide migration settings.
pub mod config;
