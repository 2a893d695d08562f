//! Usage statistics snapshot.

use serde::{Deserialize, Serialize};

/// Point-in-time view of limiter usage, for monitoring.
///
/// The request counters only grow over the life of the process.
/// `daily_credits_used` resets with the daily budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UsageStats {
    /// Execution attempts admitted so far
    pub total_requests: u64,

    /// Admission checks that were denied
    pub throttled_requests: u64,

    /// Calls rejected back to their callers
    pub failed_requests: u64,

    /// Credits consumed since the last daily reset
    pub daily_credits_used: u64,

    /// Credits consumed in the current one-second window
    pub current_second_credits: u64,

    /// Credits counted against the daily budget
    pub current_day_credits: u64,

    /// Daily credits still available
    pub remaining_daily_credits: u64,

    /// Calls waiting in the dispatch queue
    pub queue_length: usize,
}
