use std::cell::RefCell;

thread_local! {
    static LOG_CONTEXT: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// A scope guard that sets a logging context and restores the previous one when dropped.
///
/// Public methods exported with `#[state_export]` open one automatically, named after
/// the exported type.
///
/// # Examples
///
/// ```rust
/// use state_migrator::primitives::logger::{get_context, LogContext};
///
/// {
///     let _ctx = LogContext::new("MigrationRunner");
///     assert_eq!(get_context().as_deref(), Some("[MigrationRunner]"));
/// }
/// assert_eq!(get_context(), None);
/// ```
pub struct LogContext {
    previous: Option<String>,
}

impl LogContext {
    /// Opens a logging context for `module` until the guard is dropped.
    #[must_use]
    pub fn new(module: &str) -> Self {
        let previous = LOG_CONTEXT.with(|ctx| ctx.borrow_mut().replace(format!("[{module}]")));
        Self { previous }
    }
}

impl Drop for LogContext {
    fn drop(&mut self) {
        LOG_CONTEXT.with(|ctx| {
            (*ctx.borrow_mut()).clone_from(&self.previous);
        });
    }
}

/// Gets the current logging context, if any.
#[must_use]
pub fn get_context() -> Option<String> {
    LOG_CONTEXT.with(|ctx| ctx.borrow().clone())
}
