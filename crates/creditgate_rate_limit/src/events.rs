//! Typed notifications for monitoring collaborators.
//!
//! Notifications are fanned out over a Tokio broadcast channel. Nothing in the
//! limiter depends on anyone listening: with no subscribers an event is simply
//! dropped.

use crate::{DenialReason, UsageStats};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Largest per-subscriber buffer a bus will allocate.
pub const MAX_EVENT_CAPACITY: usize = 65_536;

/// Warning categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WarningKind {
    /// Daily credit usage crossed the warning ratio
    DailyLimit,
}

/// Notification emitted by the limiter.
#[derive(Debug, Clone, PartialEq, Serialize, strum::AsRefStr)]
#[serde(tag = "event", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LimiterEvent {
    /// Admission of the queue head was denied
    Throttled {
        /// Method of the denied call
        method: String,
        /// Budget that denied it
        reason: DenialReason,
    },

    /// A call was requeued after an upstream rate-limit rejection
    Retry {
        /// Method of the requeued call
        method: String,
        /// Retry number, starting at 1
        retry: u32,
        /// Backoff applied before requeueing
        backoff_ms: u64,
    },

    /// A usage threshold was crossed
    Warning {
        /// What crossed
        kind: WarningKind,
        /// Usage at the moment of crossing
        stats: UsageStats,
    },
}

/// Fan-out sender for [`LimiterEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LimiterEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    ///
    /// `capacity` is clamped to `1..=MAX_EVENT_CAPACITY`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.clamp(1, MAX_EVENT_CAPACITY));
        Self { sender }
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LimiterEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to every current subscriber.
    pub fn emit(&self, event: LimiterEvent) {
        let name = event.as_ref().to_string();
        match self.sender.send(event) {
            Ok(receivers) => debug!(event = %name, receivers, "Emitted limiter event"),
            Err(_) => debug!(event = %name, "No subscribers for limiter event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_is_clamped() {
        let bus = EventBus::new(usize::MAX);
        let mut events = bus.subscribe();
        bus.emit(LimiterEvent::Throttled {
            method: "eth_call".to_string(),
            reason: DenialReason::DailyLimit,
        });
        assert!(events.try_recv().is_ok());

        let bus = EventBus::new(0);
        let mut events = bus.subscribe();
        bus.emit(LimiterEvent::Retry {
            method: "eth_call".to_string(),
            retry: 1,
            backoff_ms: 2000,
        });
        assert!(events.try_recv().is_ok());
    }

    #[test]
    fn test_events_serialize_tagged() {
        let event = LimiterEvent::Throttled {
            method: "eth_getLogs".to_string(),
            reason: DenialReason::PerSecondLimit,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "throttled");
        assert_eq!(json["reason"], "per_second_limit");
        assert_eq!(event.as_ref(), "throttled");
    }
}
