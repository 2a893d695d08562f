//! The limiter service handle.

use crate::{
    BatchAdvisor, BatchPlan, Calendar, CostModel, CreditAccountant, DispatchQueue, EventBus,
    LimiterConfig, LimiterEvent, LocalCalendar, MonitorTasks, UsageStats, spawn_event_logger,
    spawn_stats_reporter,
};
use creditgate_error::{CreditgateResult, DispatchError, DispatchErrorKind, RetryableError};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, instrument};

/// Credit-metered gateway in front of a rate-limited upstream.
///
/// Construct one per upstream account and hand clones of the handle to
/// every component that calls the upstream; all clones share the same
/// budgets, queue and statistics.
///
/// Budgets reset on two background tickers owned by the limiter: every
/// second for the per-second window, and on calendar-day change (checked at
/// the configured interval) for the daily budget.
///
/// # Example
///
/// ```rust,ignore
/// use creditgate_rate_limit::{CreditLimiter, LimiterConfig};
///
/// let limiter = CreditLimiter::new(LimiterConfig::load()?)?;
///
/// let block = limiter
///     .submit("eth_blockNumber", || async { client.block_number().await })
///     .await?;
///
/// let stats = limiter.stats().await;
/// println!("{} credits left today", stats.remaining_daily_credits);
/// ```
#[derive(Debug, Clone)]
pub struct CreditLimiter {
    inner: Arc<LimiterInner>,
}

#[derive(Debug)]
struct LimiterInner {
    config: LimiterConfig,
    accountant: Arc<CreditAccountant>,
    queue: DispatchQueue,
    events: EventBus,
    advisor: BatchAdvisor,
}

impl CreditLimiter {
    /// Create a limiter using the local calendar for daily resets.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or no runtime is
    /// available.
    pub fn new(config: LimiterConfig) -> CreditgateResult<Self> {
        Self::with_calendar(config, Arc::new(LocalCalendar))
    }

    /// Create a limiter that reads the current date from `calendar`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or no runtime is
    /// available.
    #[instrument(skip_all)]
    pub fn with_calendar(
        config: LimiterConfig,
        calendar: Arc<dyn Calendar>,
    ) -> CreditgateResult<Self> {
        config.validate()?;
        tokio::runtime::Handle::try_current()
            .map_err(|_| DispatchError::new(DispatchErrorKind::NoRuntime))?;

        let accountant = Arc::new(CreditAccountant::new(
            config.limits().clone(),
            CostModel::from_config(config.costs()),
            *config.monitoring().daily_warning_ratio(),
            calendar.today(),
        ));
        accountant.spawn_resets(calendar, config.monitoring().day_check_interval());

        let events = EventBus::new(*config.monitoring().event_capacity());
        let queue = DispatchQueue::new(
            Arc::clone(&accountant),
            events.clone(),
            config.retry().clone(),
        );
        let advisor = BatchAdvisor::from_config(&config);

        info!(
            safe_per_second = config.limits().safe_per_second(),
            max_per_day = config.limits().max_per_day(),
            "Credit limiter started"
        );

        Ok(Self {
            inner: Arc::new(LimiterInner {
                config,
                accountant,
                queue,
                events,
                advisor,
            }),
        })
    }

    /// Run `operation` through the dispatch queue.
    ///
    /// See [`DispatchQueue::submit`] for ordering, retry and error semantics.
    pub async fn submit<T, E, F, Fut>(&self, method: &str, operation: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: RetryableError + From<DispatchError> + Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.inner.queue.submit(method, operation).await
    }

    /// Current usage statistics.
    pub async fn stats(&self) -> UsageStats {
        self.inner.queue.stats().await
    }

    /// Subscribe to throttle, retry and warning notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<LimiterEvent> {
        self.inner.events.subscribe()
    }

    /// Batch advice for operations costing `cost_per_operation` credits.
    pub fn advise(&self, cost_per_operation: u64) -> BatchPlan {
        self.inner.advisor.advise(cost_per_operation)
    }

    /// Batch advice for calls of `method`, priced by the cost table.
    pub fn advise_for_method(&self, method: &str) -> BatchPlan {
        self.advise(self.cost_of(method))
    }

    /// Credits one call of `method` costs.
    pub fn cost_of(&self, method: &str) -> u64 {
        self.inner.accountant.cost_of(method)
    }

    /// Start logging stats every `monitoring.stats_interval_secs` and every
    /// notification as it is emitted.
    ///
    /// The stats reporter holds a clone of the limiter, so abort the tasks
    /// when shutting down.
    pub fn spawn_monitoring(&self) -> MonitorTasks {
        MonitorTasks {
            stats_reporter: spawn_stats_reporter(
                self.clone(),
                self.inner.config.monitoring().stats_interval(),
            ),
            event_logger: spawn_event_logger(self.subscribe()),
        }
    }

    /// Configuration the limiter was built from.
    pub fn config(&self) -> &LimiterConfig {
        &self.inner.config
    }

    /// The dispatch queue behind this limiter.
    pub fn queue(&self) -> &DispatchQueue {
        &self.inner.queue
    }
}
