//! Bounded retry around a [`RecordSink`].

use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{AppError, DeliveryError, Result, RetryError};
use crate::sink::RecordSink;
use crate::types::UserRecord;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Upper bound for growing backoff strategies.
pub const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(60);

/// Backoff strategy names accepted on the command line and in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Same delay between every attempt
    #[default]
    Fixed,
    /// Delay grows by the base delay after each failure
    Linear,
    /// Delay doubles after each failure
    Exponential,
}

/// Wait between two delivery attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    Linear { initial: Duration, max: Duration },
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    pub fn from_kind(kind: BackoffKind, delay: Duration) -> Self {
        match kind {
            BackoffKind::Fixed => Backoff::Fixed(delay),
            BackoffKind::Linear => Backoff::Linear {
                initial: delay,
                max: MAX_BACKOFF_DELAY.max(delay),
            },
            BackoffKind::Exponential => Backoff::Exponential {
                initial: delay,
                max: MAX_BACKOFF_DELAY.max(delay),
            },
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Linear { initial, max } => initial.saturating_mul(attempt).min(max),
            Backoff::Exponential { initial, max } => {
                let factor = 2u32.saturating_pow(attempt - 1);
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed(DEFAULT_RETRY_DELAY)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    /// Zero attempts is rejected rather than silently never calling the sink.
    pub fn new(max_attempts: u32, backoff: Backoff) -> Result<Self> {
        if max_attempts == 0 {
            return Err(AppError::InvalidAttempts);
        }
        Ok(Self {
            max_attempts,
            backoff,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::default(),
        }
    }
}

/// Successful delivery, with the number of sink calls it took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivered {
    pub attempts: u32,
}

pub struct RetryingDelivery<K> {
    sink: K,
    policy: RetryPolicy,
}

impl<K: RecordSink> RetryingDelivery<K> {
    pub fn new(sink: K, policy: RetryPolicy) -> Self {
        Self { sink, policy }
    }

    /// Deliver `record`, retrying failed attempts up to the policy limit.
    ///
    /// Only the final outcome leaves this function: individual
    /// [`DeliveryError`]s are logged and retried. Exhaustion carries the
    /// error of the last attempt.
    pub async fn deliver(
        &self,
        cancel: &CancellationToken,
        record: &UserRecord,
    ) -> std::result::Result<Delivered, RetryError> {
        let max_attempts = self.policy.max_attempts;
        let start = Instant::now();
        let mut last_error: Option<DeliveryError> = None;
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled {
                    attempts: attempt,
                    last_error,
                });
            }

            attempt += 1;
            let err = match self.sink.deliver(cancel, record).await {
                Ok(()) => {
                    info!(email = %record.email, attempt, "Successfully sent user");
                    return Ok(Delivered { attempts: attempt });
                }
                Err(DeliveryError::Cancelled) => {
                    return Err(RetryError::Cancelled {
                        attempts: attempt,
                        last_error,
                    });
                }
                Err(err) => err,
            };

            if attempt >= max_attempts {
                warn!(
                    email = %record.email,
                    attempt,
                    max_attempts,
                    error = %err,
                    "Delivery attempt failed, giving up"
                );
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    source: err,
                    elapsed: start.elapsed(),
                });
            }

            let delay = self.policy.backoff.delay_for(attempt);
            warn!(
                email = %record.email,
                attempt,
                max_attempts,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "Delivery attempt failed, retrying"
            );
            last_error = Some(err);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled {
                        attempts: attempt,
                        last_error,
                    });
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    /// Sink that replays scripted status codes (200 means success) and
    /// remembers when each call happened. Runs out into `fallback`.
    pub(crate) struct ScriptedSink {
        script: Mutex<VecDeque<u16>>,
        fallback: u16,
        pub calls: Mutex<Vec<(String, Instant)>>,
    }

    impl ScriptedSink {
        pub(crate) fn new(script: impl IntoIterator<Item = u16>, fallback: u16) -> Self {
            Self {
                script: Mutex::new(script.into_iter().collect()),
                fallback,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn always(status: u16) -> Self {
            Self::new([], status)
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub(crate) fn called_emails(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(email, _)| email.clone())
                .collect()
        }
    }

    impl RecordSink for &ScriptedSink {
        async fn deliver(
            &self,
            cancel: &CancellationToken,
            record: &UserRecord,
        ) -> std::result::Result<(), DeliveryError> {
            if cancel.is_cancelled() {
                return Err(DeliveryError::Cancelled);
            }
            self.calls
                .lock()
                .unwrap()
                .push((record.email.clone(), Instant::now()));
            let status = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(self.fallback);
            if (200..300).contains(&status) {
                Ok(())
            } else {
                Err(DeliveryError::Status { status })
            }
        }
    }

    fn record() -> UserRecord {
        UserRecord::new("A", "a@x.biz")
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Backoff::Fixed(Duration::from_secs(2))).unwrap()
    }

    #[test]
    fn test_zero_attempts_rejected() {
        assert!(matches!(
            RetryPolicy::new(0, Backoff::default()),
            Err(AppError::InvalidAttempts)
        ));
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.backoff(), Backoff::Fixed(Duration::from_secs(2)));
    }

    #[test]
    fn test_fixed_backoff_is_constant() {
        let backoff = Backoff::Fixed(Duration::from_secs(2));
        assert_eq!(backoff.delay_for(1), Duration::from_secs(2));
        assert_eq!(backoff.delay_for(5), Duration::from_secs(2));
    }

    #[test]
    fn test_linear_backoff() {
        let backoff = Backoff::from_kind(BackoffKind::Linear, Duration::from_secs(2));
        assert_eq!(backoff.delay_for(1), Duration::from_secs(2));
        assert_eq!(backoff.delay_for(3), Duration::from_secs(6));
        assert_eq!(backoff.delay_for(100), MAX_BACKOFF_DELAY);
    }

    #[test]
    fn test_exponential_backoff() {
        let backoff = Backoff::from_kind(BackoffKind::Exponential, Duration::from_secs(1));
        assert_eq!(backoff.delay_for(1), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(2));
        assert_eq!(backoff.delay_for(4), Duration::from_secs(8));
        assert_eq!(backoff.delay_for(40), MAX_BACKOFF_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_two_failures() {
        let sink = ScriptedSink::new([500, 502], 200);
        let delivery = RetryingDelivery::new(&sink, policy(3));

        let delivered = delivery
            .deliver(&CancellationToken::new(), &record())
            .await
            .unwrap();

        assert_eq!(delivered.attempts, 3);
        assert_eq!(sink.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_makes_one_call() {
        let sink = ScriptedSink::always(204);
        let delivery = RetryingDelivery::new(&sink, policy(3));

        let delivered = delivery
            .deliver(&CancellationToken::new(), &record())
            .await
            .unwrap();

        assert_eq!(delivered.attempts, 1);
        assert_eq!(sink.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_keeps_last_cause() {
        let sink = ScriptedSink::new([500, 502], 503);
        let delivery = RetryingDelivery::new(&sink, policy(3));

        let err = delivery
            .deliver(&CancellationToken::new(), &record())
            .await
            .unwrap_err();

        assert_eq!(sink.call_count(), 3);
        match err {
            RetryError::Exhausted {
                attempts, source, ..
            } => {
                assert_eq!(attempts, 3);
                assert!(matches!(source, DeliveryError::Status { status: 503 }));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_spaced_by_fixed_delay() {
        let sink = ScriptedSink::always(500);
        let delivery = RetryingDelivery::new(&sink, policy(3));

        let started = Instant::now();
        let _ = delivery.deliver(&CancellationToken::new(), &record()).await;

        let calls = sink.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            let gap = pair[1].1 - pair[0].1;
            assert!(gap >= Duration::from_secs(2), "gap too short: {gap:?}");
            assert!(gap < Duration::from_millis(2100), "gap too long: {gap:?}");
        }
        // No wait after the final attempt
        assert!(started.elapsed() < Duration::from_millis(4200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_policy() {
        let sink = ScriptedSink::always(500);
        let delivery = RetryingDelivery::new(&sink, policy(1));

        let err = delivery
            .deliver(&CancellationToken::new(), &record())
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), 1);
        assert_eq!(sink.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_wait_stops_retries() {
        let sink = ScriptedSink::always(500);
        let delivery = RetryingDelivery::new(&sink, policy(3));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = delivery.deliver(&cancel, &record()).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(sink.call_count(), 1);
        match err {
            RetryError::Cancelled {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 1);
                assert!(matches!(
                    last_error,
                    Some(DeliveryError::Status { status: 500 })
                ));
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_makes_no_attempt() {
        let sink = ScriptedSink::always(200);
        let delivery = RetryingDelivery::new(&sink, policy(3));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = delivery.deliver(&cancel, &record()).await.unwrap_err();

        assert!(matches!(err, RetryError::Cancelled { attempts: 0, .. }));
        assert_eq!(sink.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_in_flight_attempt() {
        use crate::client::build_http_client;
        use crate::sink::HttpSink;
        use url::Url;
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let http = build_http_client(Duration::from_secs(10)).unwrap();
        let sink = HttpSink::new(http, Url::parse(&format!("{}/hook", server.uri())).unwrap());
        let delivery = RetryingDelivery::new(sink, policy(3));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = delivery.deliver(&cancel, &record()).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(matches!(
            err,
            RetryError::Cancelled {
                attempts: 1,
                last_error: None
            }
        ));
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }
}
