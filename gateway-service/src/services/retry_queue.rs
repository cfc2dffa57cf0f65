//! Retry queue for mutating auth operations interrupted by an outage.
//!
//! Sign-in, refresh, and sign-out calls that fail network-classified are
//! parked here instead of being silently dropped. When connectivity returns
//! the queue is drained in FIFO order; a failed replay stops the pass and
//! requeues the remainder, with exponentially backed-off passes up to a
//! bound. Operations that never confirm are surfaced, not lost.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use uuid::Uuid;

use crate::services::identity::IdentityError;

pub type RetryFuture = Pin<Box<dyn Future<Output = Result<(), IdentityError>> + Send>>;
pub type RetryOp = Box<dyn Fn() -> RetryFuture + Send + Sync>;

/// A queued mutating operation awaiting replay.
pub struct RetryAction {
    pub id: Uuid,
    pub label: String,
    pub enqueued_at: DateTime<Utc>,
    attempts: u32,
    op: RetryOp,
}

/// Replay pacing. The backoff shape mirrors the platform's client retry
/// conventions: exponential with a cap and 25% jitter.
#[derive(Clone, Debug)]
pub struct RetryQueueConfig {
    /// Replay attempts per action before it is surfaced as unconfirmed.
    pub max_attempts: u32,
    /// Drain passes per reconnect event.
    pub max_drain_passes: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    pub add_jitter: bool,
}

impl Default for RetryQueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_drain_passes: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

impl RetryQueueConfig {
    fn backoff_duration(&self, pass: u32) -> Duration {
        let backoff =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(pass as i32);
        let backoff_ms = backoff.min(self.max_backoff.as_millis() as f64) as u64;

        let mut duration = Duration::from_millis(backoff_ms);

        if self.add_jitter {
            let jitter = (backoff_ms as f64 * 0.25 * rand::random::<f64>()) as u64;
            duration += Duration::from_millis(jitter);
        }

        duration
    }
}

/// An action that could not be confirmed within the retry bounds.
#[derive(Debug, Clone, Serialize)]
pub struct UnconfirmedAction {
    pub id: Uuid,
    pub label: String,
    pub enqueued_at: DateTime<Utc>,
    pub error: String,
}

/// Outcome of one `drain_on_reconnect` call.
#[derive(Debug, Default, Serialize)]
pub struct DrainReport {
    /// Labels of actions replayed successfully, in enqueue order.
    pub replayed: Vec<String>,
    pub unconfirmed: Vec<UnconfirmedAction>,
    /// Actions still queued when the pass budget ran out.
    pub remaining: usize,
    /// True when another drain was already running and this call did nothing.
    pub already_draining: bool,
}

pub struct RetryQueue {
    queue: Mutex<VecDeque<RetryAction>>,
    drain_lock: Mutex<()>,
    config: RetryQueueConfig,
}

impl RetryQueue {
    pub fn new(config: RetryQueueConfig) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            drain_lock: Mutex::new(()),
            config,
        }
    }

    pub async fn enqueue(&self, label: impl Into<String>, op: RetryOp) -> Uuid {
        let action = RetryAction {
            id: Uuid::new_v4(),
            label: label.into(),
            enqueued_at: Utc::now(),
            attempts: 0,
            op,
        };
        let id = action.id;
        let mut queue = self.queue.lock().await;
        queue.push_back(action);
        tracing::info!(action_id = %id, pending = queue.len(), "Queued auth operation for replay");
        id
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }

    /// Replay queued operations in FIFO order. Only one drain runs at a
    /// time; a reconnect signal arriving mid-drain is a no-op.
    pub async fn drain_on_reconnect(&self) -> DrainReport {
        let _guard = match self.drain_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                return DrainReport {
                    already_draining: true,
                    ..DrainReport::default()
                };
            }
        };

        let mut report = DrainReport::default();

        'passes: for pass in 0..self.config.max_drain_passes {
            if pass > 0 {
                sleep(self.config.backoff_duration(pass - 1)).await;
            }

            loop {
                let action = self.queue.lock().await.pop_front();
                let Some(mut action) = action else {
                    break 'passes;
                };

                match (action.op)().await {
                    Ok(()) => {
                        tracing::info!(
                            action_id = %action.id,
                            label = %action.label,
                            "Replayed queued auth operation"
                        );
                        report.replayed.push(action.label);
                    }
                    Err(err) => {
                        action.attempts += 1;
                        let exhausted = action.attempts >= self.config.max_attempts;
                        if exhausted || !err.is_network() {
                            tracing::warn!(
                                action_id = %action.id,
                                label = %action.label,
                                attempts = action.attempts,
                                error = %err,
                                "Dropping unconfirmed auth operation"
                            );
                            report.unconfirmed.push(UnconfirmedAction {
                                id: action.id,
                                label: action.label,
                                enqueued_at: action.enqueued_at,
                                error: err.to_string(),
                            });
                        } else {
                            self.queue.lock().await.push_front(action);
                        }
                        // A failed replay ends the pass; the remainder stays
                        // queued for the next one.
                        continue 'passes;
                    }
                }
            }
        }

        report.remaining = self.queue.lock().await.len();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_config() -> RetryQueueConfig {
        RetryQueueConfig {
            max_attempts: 2,
            max_drain_passes: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            add_jitter: false,
        }
    }

    fn succeeding_op(counter: Arc<AtomicU32>) -> RetryOp {
        Box::new(move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn test_drain_replays_in_fifo_order_exactly_once() {
        let queue = RetryQueue::new(quick_config());
        let calls = Arc::new(AtomicU32::new(0));
        queue.enqueue("refresh", succeeding_op(calls.clone())).await;
        queue.enqueue("sign_out", succeeding_op(calls.clone())).await;

        let report = queue.drain_on_reconnect().await;

        assert_eq!(report.replayed, vec!["refresh", "sign_out"]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_failed_replay_requeues_and_retries_next_pass() {
        let queue = RetryQueue::new(quick_config());
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_in_op = attempts.clone();
        // Fails once, then succeeds.
        queue
            .enqueue(
                "refresh",
                Box::new(move || {
                    let attempts = attempts_in_op.clone();
                    Box::pin(async move {
                        if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err(IdentityError::Unavailable("still down".to_string()))
                        } else {
                            Ok(())
                        }
                    })
                }),
            )
            .await;

        let report = queue.drain_on_reconnect().await;

        assert_eq!(report.replayed, vec!["refresh"]);
        assert!(report.unconfirmed.is_empty());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_action_is_surfaced_not_lost() {
        let queue = RetryQueue::new(quick_config());
        queue
            .enqueue(
                "sign_out",
                Box::new(|| {
                    Box::pin(async { Err(IdentityError::Unavailable("down".to_string())) })
                }),
            )
            .await;

        let report = queue.drain_on_reconnect().await;

        assert!(report.replayed.is_empty());
        assert_eq!(report.unconfirmed.len(), 1);
        assert_eq!(report.unconfirmed[0].label, "sign_out");
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn test_credential_failure_is_not_retried() {
        let queue = RetryQueue::new(quick_config());
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_in_op = attempts.clone();
        queue
            .enqueue(
                "refresh",
                Box::new(move || {
                    let attempts = attempts_in_op.clone();
                    Box::pin(async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err(IdentityError::Rejected("session revoked".to_string()))
                    })
                }),
            )
            .await;

        let report = queue.drain_on_reconnect().await;

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(report.unconfirmed.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_drains_do_not_duplicate_replays() {
        let queue = Arc::new(RetryQueue::new(RetryQueueConfig {
            initial_backoff: Duration::from_millis(20),
            ..quick_config()
        }));
        let calls = Arc::new(AtomicU32::new(0));
        // First op blocks long enough for the second drain signal to arrive.
        let calls_in_op = calls.clone();
        queue
            .enqueue(
                "slow",
                Box::new(move || {
                    let calls = calls_in_op.clone();
                    Box::pin(async move {
                        sleep(Duration::from_millis(50)).await;
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    })
                }),
            )
            .await;

        let first = tokio::spawn({
            let queue = queue.clone();
            async move { queue.drain_on_reconnect().await }
        });
        sleep(Duration::from_millis(10)).await;
        let second = queue.drain_on_reconnect().await;

        assert!(second.already_draining);
        let first = first.await.expect("drain task");
        assert_eq!(first.replayed, vec!["slow"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
