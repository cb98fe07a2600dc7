//! Metrics definitions for the room orchestrator.
//!
//! Prometheus naming conventions: `room_` prefix, `_total` suffix for
//! counters.
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `event`: the handful of provider webhook event names

use metrics::counter;

/// Record one inbound webhook, by event name.
///
/// Metric: `room_webhook_events_total`
/// Labels: `event`
pub fn record_webhook(event: &str) {
    counter!("room_webhook_events_total",
        "event" => normalize_event(event)
    )
    .increment(1);
}

/// Record a transition suppressed by its idempotency guard.
///
/// Metric: `room_transitions_suppressed_total`
/// Labels: `event`
///
/// A steadily climbing value is normal (providers redeliver); a spike
/// indicates a retry storm or an operator-made state inconsistency.
pub fn record_suppressed(event: &str) {
    counter!("room_transitions_suppressed_total",
        "event" => normalize_event(event)
    )
    .increment(1);
}

/// Record one successful room allocation.
///
/// Metric: `room_allocations_total`
pub fn record_allocation() {
    counter!("room_allocations_total").increment(1);
}

/// Record one exhausted pool pass.
///
/// Metric: `room_pool_exhausted_total`
///
/// Non-zero values mean users were refused a start; alert on this.
pub fn record_pool_exhausted() {
    counter!("room_pool_exhausted_total").increment(1);
}

/// Record delivered session-started notices.
///
/// Metric: `room_notifications_total`
pub fn record_notifications(count: u64) {
    counter!("room_notifications_total").increment(count);
}

/// Bound the `event` label to the names this core knows about.
fn normalize_event(event: &str) -> String {
    match event {
        "meeting.started"
        | "meeting.ended"
        | "recording.completed"
        | "meeting.participant_joined"
        | "meeting.participant_left" => event.to_string(),
        _ => "other".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_event_passes_known_names() {
        assert_eq!(normalize_event("meeting.started"), "meeting.started");
        assert_eq!(
            normalize_event("meeting.participant_left"),
            "meeting.participant_left"
        );
    }

    #[test]
    fn test_normalize_event_bounds_unknown_names() {
        assert_eq!(normalize_event("meeting.sharing_started"), "other");
        assert_eq!(normalize_event(""), "other");
    }
}
