//! Admission control over the per-second and per-day credit budgets.
//!
//! The accountant owns the only mutable budget state in the limiter. Callers
//! interact with it through [`CreditAccountant::can_admit`] and
//! [`CreditAccountant::record_usage`]; two background tickers roll the
//! per-second window every second and zero the daily budget whenever the
//! observed calendar date changes.
//!
//! The per-second window is also rolled lazily on every check once a full
//! second has passed since it opened, so a check that lands on the same
//! instant as the ticker still sees a fresh window. A window is never rolled
//! twice within one second.

use crate::{CostModel, CreditLimits, UsageStats};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, info, instrument, trace};

/// Length of the per-second quota window.
const SECOND_WINDOW: Duration = Duration::from_secs(1);

/// Source of the current calendar date for the daily reset.
pub trait Calendar: Send + Sync + 'static {
    /// Today's date.
    fn today(&self) -> NaiveDate;
}

/// Calendar backed by the local system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCalendar;

impl Calendar for LocalCalendar {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Why an admission check was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// The daily budget cannot fit the call
    #[display("daily limit exceeded")]
    DailyLimit,
    /// The current one-second window cannot fit the call
    #[display("per-second rate limit")]
    PerSecondLimit,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The call fits both budgets
    Allowed,
    /// The call must wait
    Denied(DenialReason),
}

impl Admission {
    /// True if the call may run now.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }

    /// Reason for a denial, if any.
    pub fn reason(&self) -> Option<DenialReason> {
        match self {
            Admission::Allowed => None,
            Admission::Denied(reason) => Some(*reason),
        }
    }
}

/// Result of recording one admitted execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedUsage {
    /// Credits charged
    pub cost: u64,
    /// True if this charge moved daily usage across the warning threshold
    pub crossed_daily_warning: bool,
}

#[derive(Debug)]
struct BudgetState {
    second_credits: u64,
    second_started: Instant,
    day_credits: u64,
    day: NaiveDate,
    warned_today: bool,
    total_requests: u64,
    throttled_requests: u64,
    failed_requests: u64,
    daily_credits_used: u64,
}

impl BudgetState {
    fn open_second_window(&mut self) {
        self.second_credits = 0;
        self.second_started = Instant::now();
    }

    fn roll_second_if_due(&mut self) {
        if self.second_started.elapsed() >= SECOND_WINDOW {
            self.open_second_window();
        }
    }
}

/// Tracks consumed credits against the per-second and per-day budgets.
///
/// # Example
///
/// ```
/// use creditgate_rate_limit::{CostModel, CreditAccountant, CreditLimits};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let limits = CreditLimits::default().with_safe_per_second(20);
/// let today = chrono::NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
/// let accountant = CreditAccountant::new(limits, CostModel::new(10), 0.8, today);
///
/// assert!(accountant.can_admit("eth_call").await.is_allowed());
/// accountant.record_usage("eth_call").await;
/// accountant.record_usage("eth_call").await;
/// assert!(!accountant.can_admit("eth_call").await.is_allowed());
///
/// accountant.reset_second().await;
/// assert!(accountant.can_admit("eth_call").await.is_allowed());
/// # }
/// ```
#[derive(Debug)]
pub struct CreditAccountant {
    limits: CreditLimits,
    costs: CostModel,
    warning_threshold: u64,
    state: Mutex<BudgetState>,
}

impl CreditAccountant {
    /// Create an accountant with empty budgets for the given day.
    ///
    /// `warning_ratio` is the fraction of `max_per_day` at which the daily
    /// warning fires.
    pub fn new(
        limits: CreditLimits,
        costs: CostModel,
        warning_ratio: f64,
        today: NaiveDate,
    ) -> Self {
        let warning_threshold = (*limits.max_per_day() as f64 * warning_ratio).ceil() as u64;
        Self {
            limits,
            costs,
            warning_threshold,
            state: Mutex::new(BudgetState {
                second_credits: 0,
                second_started: Instant::now(),
                day_credits: 0,
                day: today,
                warned_today: false,
                total_requests: 0,
                throttled_requests: 0,
                failed_requests: 0,
                daily_credits_used: 0,
            }),
        }
    }

    /// Budgets this accountant enforces.
    pub fn limits(&self) -> &CreditLimits {
        &self.limits
    }

    /// Cost table used for admission.
    pub fn costs(&self) -> &CostModel {
        &self.costs
    }

    /// Credits one call of `method` costs.
    pub fn cost_of(&self, method: &str) -> u64 {
        self.costs.cost_of(method)
    }

    /// Decide whether a call of `method` fits the budgets right now.
    ///
    /// The daily budget is checked first so the more severe condition is the
    /// one reported.
    #[instrument(skip(self))]
    pub async fn can_admit(&self, method: &str) -> Admission {
        let cost = self.cost_of(method);
        let mut state = self.state.lock().await;
        state.roll_second_if_due();

        let admission = if state.day_credits + cost > *self.limits.max_per_day() {
            Admission::Denied(DenialReason::DailyLimit)
        } else if state.second_credits + cost > *self.limits.safe_per_second() {
            Admission::Denied(DenialReason::PerSecondLimit)
        } else {
            Admission::Allowed
        };

        trace!(
            cost,
            second_credits = state.second_credits,
            day_credits = state.day_credits,
            ?admission,
            "Admission check"
        );
        admission
    }

    /// Charge one admitted execution attempt of `method`.
    ///
    /// Call exactly once per attempt that actually runs.
    #[instrument(skip(self))]
    pub async fn record_usage(&self, method: &str) -> RecordedUsage {
        let cost = self.cost_of(method);
        let mut state = self.state.lock().await;
        state.roll_second_if_due();

        let before = state.day_credits;
        state.second_credits += cost;
        state.day_credits += cost;
        state.daily_credits_used += cost;
        state.total_requests += 1;

        let crossed_daily_warning = !state.warned_today
            && before < self.warning_threshold
            && state.day_credits >= self.warning_threshold;
        if crossed_daily_warning {
            state.warned_today = true;
        }

        debug!(
            cost,
            second_credits = state.second_credits,
            day_credits = state.day_credits,
            "Recorded credit usage"
        );

        RecordedUsage {
            cost,
            crossed_daily_warning,
        }
    }

    /// Count a denied admission check.
    pub async fn record_throttle(&self) {
        self.state.lock().await.throttled_requests += 1;
    }

    /// Count a call rejected back to its caller.
    pub async fn record_failure(&self) {
        self.state.lock().await.failed_requests += 1;
    }

    /// Zero the per-second window now, opening a new one.
    pub async fn reset_second(&self) {
        self.state.lock().await.open_second_window();
    }

    /// Roll the per-second window if it has been open for a full second.
    pub async fn roll_second(&self) {
        self.state.lock().await.roll_second_if_due();
    }

    /// Zero the daily budget if `today` differs from the tracked day.
    ///
    /// Returns true if a rollover happened.
    #[instrument(skip(self))]
    pub async fn roll_day(&self, today: NaiveDate) -> bool {
        let mut state = self.state.lock().await;
        if state.day == today {
            return false;
        }

        info!(
            previous = %state.day,
            credits_used = state.daily_credits_used,
            "Calendar day changed, resetting daily credits"
        );
        state.day = today;
        state.day_credits = 0;
        state.daily_credits_used = 0;
        state.warned_today = false;
        true
    }

    /// Snapshot of usage, with the given queue length filled in.
    pub async fn stats(&self, queue_length: usize) -> UsageStats {
        let mut state = self.state.lock().await;
        state.roll_second_if_due();
        UsageStats {
            total_requests: state.total_requests,
            throttled_requests: state.throttled_requests,
            failed_requests: state.failed_requests,
            daily_credits_used: state.daily_credits_used,
            current_second_credits: state.second_credits,
            current_day_credits: state.day_credits,
            remaining_daily_credits: self.limits.max_per_day().saturating_sub(state.day_credits),
            queue_length,
        }
    }

    /// Start the per-second and calendar-day reset tickers.
    ///
    /// Both tasks hold only a weak reference and stop on their next tick once
    /// the accountant has been dropped. Must be called from within a Tokio
    /// runtime.
    pub fn spawn_resets(self: &Arc<Self>, calendar: Arc<dyn Calendar>, day_check: Duration) {
        let accountant = Arc::downgrade(self);
        tokio::spawn(run_second_resets(accountant));

        let accountant = Arc::downgrade(self);
        tokio::spawn(run_day_checks(accountant, calendar, day_check));
    }
}

async fn run_second_resets(accountant: Weak<CreditAccountant>) {
    let mut ticker = interval(SECOND_WINDOW);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(accountant) = accountant.upgrade() else {
            debug!("Accountant dropped, stopping per-second resets");
            break;
        };
        accountant.roll_second().await;
    }
}

async fn run_day_checks(
    accountant: Weak<CreditAccountant>,
    calendar: Arc<dyn Calendar>,
    every: Duration,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(accountant) = accountant.upgrade() else {
            debug!("Accountant dropped, stopping daily checks");
            break;
        };
        accountant.roll_day(calendar.today()).await;
    }
}
