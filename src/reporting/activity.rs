use crate::powerbi::activity::ActivityEvent;
use crate::reporting::{Count, count_top};
use serde::Serialize;

const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Serialize)]
pub struct ActivitySummary {
    pub total_events: usize,
    pub top_activities: Vec<Count>,
    pub top_users: Vec<Count>,
}

/// Event counts by activity and by user, keeping the `top` most frequent of each.
pub fn summarize_activity(events: &[ActivityEvent], top: usize) -> ActivitySummary {
    ActivitySummary {
        total_events: events.len(),
        top_activities: count_top(
            events
                .iter()
                .map(|e| e.activity.as_deref().unwrap_or(UNKNOWN)),
            Some(top),
        ),
        top_users: count_top(
            events.iter().map(|e| e.user_id.as_deref().unwrap_or(UNKNOWN)),
            Some(top),
        ),
    }
}
