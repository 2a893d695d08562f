//! Batch sizing advice for bulk callers.
//!
//! Advice only: bulk callers that ignore it still go through the dispatch
//! queue's admission control, they just waste time being throttled.

use crate::LimiterConfig;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// Suggested shape of a bulk run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchPlan {
    /// Operations per batch
    pub batch_size: u64,
    /// Pause between consecutive batches
    pub delay_between_batches: Duration,
    /// Batches that may run at once
    pub max_concurrent_batches: u64,
}

/// Derives batch sizes from the safe per-second budget.
///
/// # Example
///
/// ```
/// use creditgate_rate_limit::{BatchAdvisor, LimiterConfig};
///
/// let advisor = BatchAdvisor::from_config(&LimiterConfig::default());
/// let plan = advisor.advise(20);
/// assert_eq!(plan.batch_size, 16); // floor(400 * 0.8 / 20)
/// assert_eq!(plan.max_concurrent_batches, 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BatchAdvisor {
    safe_per_second: u64,
    headroom_factor: f64,
    max_batch_size: u64,
    delay_between_batches: Duration,
}

impl BatchAdvisor {
    /// Build an advisor from the limiter configuration.
    pub fn from_config(config: &LimiterConfig) -> Self {
        Self {
            safe_per_second: *config.limits().safe_per_second(),
            headroom_factor: *config.batching().headroom_factor(),
            max_batch_size: *config.batching().max_batch_size(),
            delay_between_batches: Duration::from_millis(
                *config.batching().delay_between_batches_ms(),
            ),
        }
    }

    /// Advise a batch shape for operations costing `cost_per_operation` credits.
    ///
    /// The batch size reserves `1 - headroom_factor` of the safe per-second
    /// budget for other traffic, is capped at the configured maximum, and is
    /// never below one. Batches are meant to run one after another.
    pub fn advise(&self, cost_per_operation: u64) -> BatchPlan {
        let budget = (self.safe_per_second as f64 * self.headroom_factor).floor() as u64;
        let batch_size = budget
            .checked_div(cost_per_operation)
            .unwrap_or(self.max_batch_size)
            .clamp(1, self.max_batch_size);

        debug!(cost_per_operation, budget, batch_size, "Advised batch size");

        BatchPlan {
            batch_size,
            delay_between_batches: self.delay_between_batches,
            max_concurrent_batches: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BatchingConfig;

    #[test]
    fn test_batch_size_from_budget() {
        let advisor = BatchAdvisor::from_config(&LimiterConfig::default());
        let plan = advisor.advise(20);
        assert_eq!(plan.batch_size, 16);
        assert_eq!(plan.max_concurrent_batches, 1);
        assert_eq!(plan.delay_between_batches, Duration::from_millis(3000));
    }

    #[test]
    fn test_batch_size_capped() {
        let advisor = BatchAdvisor::from_config(&LimiterConfig::default());
        assert_eq!(advisor.advise(1).batch_size, 50);
        assert_eq!(advisor.advise(0).batch_size, 50);
    }

    #[test]
    fn test_batch_size_never_zero() {
        let advisor = BatchAdvisor::from_config(&LimiterConfig::default());
        assert_eq!(advisor.advise(400).batch_size, 1);
    }

    #[test]
    fn test_delay_independent_of_size() {
        let config = LimiterConfig::default()
            .with_batching(BatchingConfig::default().with_delay_between_batches_ms(1500));
        let advisor = BatchAdvisor::from_config(&config);
        assert_eq!(
            advisor.advise(5).delay_between_batches,
            advisor.advise(200).delay_between_batches
        );
        assert_eq!(advisor.advise(5).delay_between_batches, Duration::from_millis(1500));
    }
}
