//! FIFO dispatch queue with head-of-line admission and retry-at-front.
//!
//! Every call to the metered upstream goes through [`DispatchQueue::submit`].
//! Submissions are appended to a single shared queue and executed one at a
//! time by a drain loop, which is started by the first submission that finds
//! the queue idle and exits once the queue is empty.
//!
//! For each head entry the loop:
//! 1. asks the [`CreditAccountant`] whether the call fits the budgets; if not,
//!    it waits and asks again without removing the head, so nothing behind it
//!    can overtake it;
//! 2. removes the head, records its usage and runs it;
//! 3. on an upstream rate-limit rejection with retries left, backs off
//!    exponentially and puts the entry back at the front;
//! 4. otherwise answers the caller with the result or the caller's own error.

use crate::{
    Admission, CreditAccountant, EventBus, LimiterEvent, RetryConfig, UsageStats, WarningKind,
};
use creditgate_error::{DispatchError, DispatchErrorKind, RetryableError};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, oneshot};
use tokio::time::sleep;
use tokio_retry2::strategy::ExponentialBackoff;
use tracing::{debug, error, info, instrument, warn};

/// What happened when a queued call ran once.
enum Attempt {
    /// The caller has been answered with a value
    Completed,
    /// The operation failed; the error is held by the call
    Failed {
        /// The error is the upstream rate-limit signal
        retryable: bool,
    },
}

/// Type-erased queued call.
trait PendingCall: Send {
    /// Run the operation once.
    fn attempt(&mut self) -> BoxFuture<'_, Attempt>;

    /// Answer the caller with the last error the operation returned.
    fn reject(self: Box<Self>, method: &str);

    /// Answer the caller with a dispatch error.
    fn reject_with(self: Box<Self>, err: DispatchError);
}

struct Call<T, E, F> {
    operation: F,
    reply: Option<oneshot::Sender<Result<T, E>>>,
    last_error: Option<E>,
}

impl<T, E, F, Fut> PendingCall for Call<T, E, F>
where
    T: Send + 'static,
    E: RetryableError + From<DispatchError> + Send + 'static,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    fn attempt(&mut self) -> BoxFuture<'_, Attempt> {
        Box::pin(async move {
            match (self.operation)().await {
                Ok(value) => {
                    if let Some(reply) = self.reply.take() {
                        // The caller may have stopped waiting.
                        let _ = reply.send(Ok(value));
                    }
                    Attempt::Completed
                }
                Err(err) => {
                    let retryable = err.is_retryable();
                    self.last_error = Some(err);
                    Attempt::Failed { retryable }
                }
            }
        })
    }

    fn reject(self: Box<Self>, method: &str) {
        let err = match self.last_error {
            Some(err) => err,
            None => E::from(DispatchError::new(DispatchErrorKind::Abandoned {
                method: method.to_string(),
            })),
        };
        if let Some(reply) = self.reply {
            let _ = reply.send(Err(err));
        }
    }

    fn reject_with(self: Box<Self>, err: DispatchError) {
        if let Some(reply) = self.reply {
            let _ = reply.send(Err(E::from(err)));
        }
    }
}

/// A call waiting in the queue.
struct QueueEntry {
    method: String,
    retry_count: u32,
    max_retries: u32,
    backoff: ExponentialBackoff,
    call: Box<dyn PendingCall>,
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<QueueEntry>,
    draining: bool,
}

struct QueueShared {
    accountant: Arc<CreditAccountant>,
    events: EventBus,
    retry: RetryConfig,
    state: Mutex<QueueState>,
}

/// Handle to the single dispatch queue in front of the upstream.
///
/// Cloning the handle shares the queue.
///
/// # Example
///
/// ```rust,ignore
/// let balance = queue
///     .submit("eth_getBalance", || async { client.get_balance(address).await })
///     .await?;
/// ```
#[derive(Clone)]
pub struct DispatchQueue {
    shared: Arc<QueueShared>,
}

impl std::fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("retry", &self.shared.retry)
            .finish_non_exhaustive()
    }
}

impl DispatchQueue {
    /// Create an idle queue admitting through `accountant`.
    pub fn new(accountant: Arc<CreditAccountant>, events: EventBus, retry: RetryConfig) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                accountant,
                events,
                retry,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Queue `operation` under `method` and wait for its outcome.
    ///
    /// The operation may run more than once: it is invoked again after each
    /// upstream rate-limit rejection (an error whose
    /// [`RetryableError::is_retryable`] is true), up to the configured retry
    /// limit. Any other error, or the last rate-limit error once retries are
    /// exhausted, is returned unchanged.
    ///
    /// A call whose budget is exhausted for the day stays queued until the
    /// daily reset; it is never failed for local budget reasons.
    ///
    /// # Errors
    ///
    /// Returns the operation's own error on permanent failure, or a
    /// [`DispatchError`] converted into `E` if the method costs more than a
    /// single call may use (refused without queueing), the operation
    /// panicked, or the drain loop was torn down before answering.
    #[instrument(skip(self, operation))]
    pub async fn submit<T, E, F, Fut>(&self, method: &str, operation: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: RetryableError + From<DispatchError> + Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let cost = self.shared.accountant.cost_of(method);
        let ceiling = self.shared.accountant.limits().admission_ceiling();
        if cost > ceiling {
            // Holding it would stall every call behind it.
            self.shared.accountant.record_failure().await;
            warn!(cost, ceiling, "Call can never be admitted, refusing it");
            return Err(E::from(DispatchError::new(
                DispatchErrorKind::CostExceedsBudget {
                    method: method.to_string(),
                    cost,
                    ceiling,
                },
            )));
        }

        let (reply, receiver) = oneshot::channel();
        let entry = QueueEntry {
            method: method.to_string(),
            retry_count: 0,
            max_retries: *self.shared.retry.max_retries(),
            // Yields 2^n * base for n = 1, 2, 3, ...
            backoff: ExponentialBackoff::from_millis(2)
                .factor(*self.shared.retry.base_backoff_ms()),
            call: Box::new(Call {
                operation,
                reply: Some(reply),
                last_error: None,
            }),
        };

        {
            let mut state = self.shared.state.lock().await;
            state.entries.push_back(entry);
            debug!(queue_length = state.entries.len(), "Call queued");
            if !state.draining {
                state.draining = true;
                debug!("Starting drain loop");
                tokio::spawn(drain(Arc::clone(&self.shared)));
            }
        }

        match receiver.await {
            Ok(result) => result,
            Err(_) => {
                warn!("Drain loop dropped the call without answering");
                Err(E::from(DispatchError::new(DispatchErrorKind::Abandoned {
                    method: method.to_string(),
                })))
            }
        }
    }

    /// Number of calls waiting, not counting one in flight.
    pub async fn len(&self) -> usize {
        self.shared.state.lock().await.entries.len()
    }

    /// True if nothing is waiting.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// True while a drain loop is active.
    pub async fn is_draining(&self) -> bool {
        self.shared.state.lock().await.draining
    }

    /// Usage snapshot including the current queue length.
    pub async fn stats(&self) -> UsageStats {
        self.shared.stats().await
    }
}

impl QueueShared {
    async fn stats(&self) -> UsageStats {
        let queue_length = self.state.lock().await.entries.len();
        self.accountant.stats(queue_length).await
    }

    /// Method of the head entry, or `None` after marking the queue idle.
    async fn head_method(&self) -> Option<String> {
        let mut state = self.state.lock().await;
        match state.entries.front() {
            Some(entry) => Some(entry.method.clone()),
            None => {
                state.draining = false;
                None
            }
        }
    }

    async fn pop_head(&self) -> Option<QueueEntry> {
        self.state.lock().await.entries.pop_front()
    }

    async fn push_head(&self, entry: QueueEntry) {
        self.state.lock().await.entries.push_front(entry);
    }
}

/// Single drain loop; runs until the queue is empty.
async fn drain(shared: Arc<QueueShared>) {
    while let Some(method) = shared.head_method().await {
        if let Admission::Denied(reason) = shared.accountant.can_admit(&method).await {
            shared.accountant.record_throttle().await;
            debug!(%method, %reason, "Admission denied, holding queue head");
            shared.events.emit(LimiterEvent::Throttled { method, reason });
            sleep(shared.retry.admission_delay()).await;
            continue;
        }

        // Only this loop removes entries, so the head is still `method`.
        let Some(mut entry) = shared.pop_head().await else {
            continue;
        };

        let recorded = shared.accountant.record_usage(&entry.method).await;
        if recorded.crossed_daily_warning {
            let stats = shared.stats().await;
            warn!(
                day_credits = stats.current_day_credits,
                remaining = stats.remaining_daily_credits,
                "Daily credit usage crossed warning threshold"
            );
            shared.events.emit(LimiterEvent::Warning {
                kind: WarningKind::DailyLimit,
                stats,
            });
        }

        let outcome = AssertUnwindSafe(entry.call.attempt()).catch_unwind().await;
        match outcome {
            Ok(Attempt::Completed) => {
                debug!(method = %entry.method, retries = entry.retry_count, "Call completed");
            }
            Ok(Attempt::Failed { retryable: true }) if entry.retry_count < entry.max_retries => {
                entry.retry_count += 1;
                // The strategy never runs dry; it saturates instead.
                let backoff = entry.backoff.next().unwrap_or_default();
                info!(
                    method = %entry.method,
                    retry = entry.retry_count,
                    backoff_ms = backoff.as_millis() as u64,
                    "Upstream rate limited, requeueing at front"
                );
                shared.events.emit(LimiterEvent::Retry {
                    method: entry.method.clone(),
                    retry: entry.retry_count,
                    backoff_ms: backoff.as_millis() as u64,
                });
                sleep(backoff).await;
                shared.push_head(entry).await;
            }
            Ok(Attempt::Failed { retryable }) => {
                shared.accountant.record_failure().await;
                warn!(
                    method = %entry.method,
                    retryable,
                    attempts = entry.retry_count + 1,
                    "Call failed permanently"
                );
                let QueueEntry { method, call, .. } = entry;
                call.reject(&method);
            }
            Err(_) => {
                shared.accountant.record_failure().await;
                error!(method = %entry.method, "Operation panicked");
                let QueueEntry { method, call, .. } = entry;
                call.reject_with(DispatchError::new(DispatchErrorKind::OperationPanicked {
                    method,
                }));
            }
        }
    }

    debug!("Queue empty, drain loop idle");
}
