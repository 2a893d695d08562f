//! Background tasks that surface limiter health in the logs.

use crate::{CreditLimiter, LimiterEvent};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Handles of the tasks started by [`CreditLimiter::spawn_monitoring`].
#[derive(Debug)]
pub struct MonitorTasks {
    /// Periodic stats logger
    pub stats_reporter: JoinHandle<()>,
    /// Event logger
    pub event_logger: JoinHandle<()>,
}

impl MonitorTasks {
    /// Stop both tasks.
    pub fn abort(&self) {
        self.stats_reporter.abort();
        self.event_logger.abort();
    }
}

/// Log a usage snapshot every `every`.
///
/// The task keeps the limiter alive; abort the returned handle to stop it.
pub fn spawn_stats_reporter(limiter: CreditLimiter, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        loop {
            ticker.tick().await;
            let stats = limiter.stats().await;
            info!(
                total_requests = stats.total_requests,
                throttled_requests = stats.throttled_requests,
                failed_requests = stats.failed_requests,
                daily_credits_used = stats.daily_credits_used,
                current_second_credits = stats.current_second_credits,
                remaining_daily_credits = stats.remaining_daily_credits,
                queue_length = stats.queue_length,
                "Credit limiter stats"
            );
        }
    })
}

/// Log every notification received on `events`.
///
/// Stops once the limiter (and with it the sender) is gone.
pub fn spawn_event_logger(mut events: broadcast::Receiver<LimiterEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger fell behind, notifications dropped");
                }
                Err(RecvError::Closed) => {
                    debug!("Event channel closed, stopping event logger");
                    break;
                }
            }
        }
    })
}

fn log_event(event: &LimiterEvent) {
    let payload = serde_json::to_string(event).unwrap_or_default();
    match event {
        LimiterEvent::Throttled { method, reason } => {
            debug!(%method, %reason, %payload, "Throttled");
        }
        LimiterEvent::Retry {
            method,
            retry,
            backoff_ms,
        } => {
            info!(%method, retry, backoff_ms, %payload, "Retry scheduled");
        }
        LimiterEvent::Warning { kind, .. } => {
            warn!(%kind, %payload, "Limiter warning");
        }
    }
}
