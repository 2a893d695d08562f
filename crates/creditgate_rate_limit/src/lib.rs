//! Credit-metered admission control for rate-limited RPC providers.
//!
//! Metered node gateways bill every method call in credits and enforce both a
//! per-second and a per-day credit budget. This crate puts a single dispatch
//! queue in front of such an upstream:
//!
//! - [`CostModel`] prices each method name in credits
//! - [`CreditAccountant`] tracks usage against both budgets and answers
//!   admission checks
//! - [`DispatchQueue`] executes calls one at a time in submission order,
//!   holding the queue head until it fits the budgets and requeueing it at the
//!   front after upstream rate-limit rejections
//! - [`BatchAdvisor`] sizes bulk runs from the safe per-second budget
//!
//! [`CreditLimiter`] wires these together and is the handle callers use.
//!
//! ```rust,ignore
//! use creditgate_rate_limit::{CreditLimiter, LimiterConfig};
//!
//! let limiter = CreditLimiter::new(LimiterConfig::load()?)?;
//! let receipt = limiter
//!     .submit("eth_getTransactionReceipt", || async { fetch_receipt(hash).await })
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod accountant;
mod advisor;
mod config;
mod cost;
mod events;
mod limiter;
mod monitor;
mod queue;
mod stats;

pub use accountant::{
    Admission, Calendar, CreditAccountant, DenialReason, LocalCalendar, RecordedUsage,
};
pub use advisor::{BatchAdvisor, BatchPlan};
pub use config::{
    BatchingConfig, CostConfig, CreditLimits, LimiterConfig, MethodCost, MonitoringConfig,
    RetryConfig,
};
pub use cost::{CostModel, DEFAULT_COST, DEFAULT_METHOD_COSTS};
pub use events::{EventBus, LimiterEvent, MAX_EVENT_CAPACITY, WarningKind};
pub use limiter::CreditLimiter;
pub use monitor::{MonitorTasks, spawn_event_logger, spawn_stats_reporter};
pub use queue::DispatchQueue;
pub use stats::UsageStats;
