use std::future::Future;

use futures::stream::{self, StreamExt};

use crate::migration::error::{MigrationError, MigrationResult};
use crate::migration::migrator::StepOutcome;

/// What a per-account task did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountChange {
    /// The account's state was rewritten
    Changed,
    /// Nothing to do for this account
    Unchanged,
}

/// Runs one task per account and joins them before the step is judged.
///
/// Tasks run concurrently, at most `concurrency` at a time, with no ordering guarantee
/// between accounts. Outcomes are classified as they complete:
/// - `MalformedAccountRecord`: logged, counted, not a failure
/// - `StorageUnavailable`: returned immediately; tasks not yet finished are dropped
/// - anything else: collected, and once every task has finished, aggregated into
///   `AccountTasksFailed`. A failing account never stops its siblings.
pub struct AccountTaskGroup {
    label: String,
    concurrency: usize,
}

impl AccountTaskGroup {
    /// Creates a group; `label` names the step in logs
    #[must_use]
    pub fn new(label: impl Into<String>, concurrency: usize) -> Self {
        Self {
            label: label.into(),
            concurrency: concurrency.max(1),
        }
    }

    /// Runs `task` for every id in `user_ids` and aggregates the outcomes
    ///
    /// # Errors
    /// - `MigrationError::StorageUnavailable` if any task hit an unreachable store
    /// - `MigrationError::AccountTasksFailed` if any task failed for another reason
    pub async fn run<F, Fut>(&self, user_ids: Vec<String>, task: F) -> MigrationResult<StepOutcome>
    where
        F: Fn(String) -> Fut + Send,
        Fut: Future<Output = MigrationResult<AccountChange>> + Send,
    {
        let total = u32::try_from(user_ids.len()).unwrap_or(u32::MAX);

        let mut results = stream::iter(user_ids)
            .map(|user_id| {
                let pending = task(user_id.clone());
                async move { (user_id, pending.await) }
            })
            .buffer_unordered(self.concurrency);

        let mut outcome = StepOutcome::default();
        let mut failures = Vec::new();

        while let Some((user_id, result)) = results.next().await {
            match result {
                Ok(AccountChange::Changed) => outcome.records_changed += 1,
                Ok(AccountChange::Unchanged) => outcome.records_unchanged += 1,
                Err(MigrationError::MalformedAccountRecord { message, .. }) => {
                    crate::warn!(
                        "migration.account_malformed step={} user_id={} error={}",
                        self.label,
                        user_id,
                        message
                    );
                    outcome.records_malformed += 1;
                }
                // Dropping the stream cancels the tasks still in flight.
                Err(e) if e.is_fatal() => {
                    crate::error!(
                        "migration.account_fatal step={} user_id={} error={}",
                        self.label,
                        user_id,
                        e
                    );
                    return Err(e);
                }
                Err(e) => {
                    crate::error!(
                        "migration.account_failed step={} user_id={} error={}",
                        self.label,
                        user_id,
                        e
                    );
                    failures.push(format!("{user_id}: {e}"));
                }
            }
        }

        if !failures.is_empty() {
            return Err(MigrationError::AccountTasksFailed {
                failed: u32::try_from(failures.len()).unwrap_or(u32::MAX),
                total,
                message: failures.join("; "),
            });
        }

        Ok(outcome)
    }
}
