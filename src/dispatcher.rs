//! Fetch, filter, and sequentially deliver one batch of users.

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::error::FetchError;
use crate::retry::RetryingDelivery;
use crate::sink::RecordSink;
use crate::source::RecordSource;
use crate::types::{Outcome, RecordReport, RunResult, UserRecord, DEFAULT_TARGET_SUFFIX};

pub struct Dispatcher<S, K> {
    source: S,
    delivery: RetryingDelivery<K>,
    suffix: String,
}

impl<S: RecordSource, K: RecordSink> Dispatcher<S, K> {
    pub fn new(source: S, delivery: RetryingDelivery<K>) -> Self {
        Self {
            source,
            delivery,
            suffix: DEFAULT_TARGET_SUFFIX.to_string(),
        }
    }

    /// Forward users whose email ends with `suffix` instead of the default.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Run one batch.
    ///
    /// A fetch failure aborts the run before anything is sent. Every fetched
    /// record is then classified exactly once, and a record that cannot be
    /// delivered never stops the ones after it.
    #[instrument(name = "dispatch_run", skip_all, fields(suffix = %self.suffix))]
    pub async fn process(&self, cancel: &CancellationToken) -> Result<RunResult, FetchError> {
        let users = self.source.fetch(cancel).await?;
        info!(count = users.len(), "Fetched users");

        let mut result = RunResult::default();
        for user in &users {
            let report = self.dispatch_one(cancel, user).await;
            result.record(report);
        }

        info!(
            delivered = result.delivered,
            skipped = result.skipped,
            failed = result.failed,
            "Run complete"
        );
        Ok(result)
    }

    async fn dispatch_one(&self, cancel: &CancellationToken, user: &UserRecord) -> RecordReport {
        if !user.is_target(&self.suffix) {
            info!(name = %user.name, email = %user.email, "Skipping user");
            return report(user, Outcome::Skipped, 0, None);
        }

        match self.delivery.deliver(cancel, user).await {
            Ok(delivered) => report(user, Outcome::Delivered, delivered.attempts, None),
            Err(e) => {
                warn!(name = %user.name, email = %user.email, error = %e, "Failed to send user");
                report(user, Outcome::Failed, e.attempts(), Some(e.to_string()))
            }
        }
    }
}

fn report(
    user: &UserRecord,
    outcome: Outcome,
    attempts: u32,
    error: Option<String>,
) -> RecordReport {
    RecordReport {
        name: user.name.clone(),
        email: user.email.clone(),
        outcome,
        attempts,
        error,
    }
}
