use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use hiveboard_types::{AgentStatus, Event, EventType, OFFLINE_AFTER_SECONDS};

/// Derive an agent's status from its event stream.
///
/// `events` must be this agent's events sorted ascending by timestamp.
/// `last_heartbeat` comes from the agent cache: historical heartbeat rows are
/// cold-pruned after ten minutes, so the cache is the only reliable
/// heartbeat source.
///
/// The ladder is checked in order: offline, stuck, waiting_approval, error,
/// processing, idle. The first rung that matches wins.
pub fn derive_status(
    events: &[Event],
    last_heartbeat: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    stuck_threshold: Duration,
) -> AgentStatus {
    let last_event_ts = events.last().map(|e| e.timestamp);

    // offline: nothing ever, or silent for a day
    let last_seen = match (last_event_ts, last_heartbeat) {
        (None, None) => return AgentStatus::Offline,
        (Some(e), None) => e,
        (None, Some(h)) => h,
        (Some(e), Some(h)) => e.max(h),
    };
    if now - last_seen > Duration::seconds(OFFLINE_AFTER_SECONDS) {
        return AgentStatus::Offline;
    }

    // stuck: mid-work but the heartbeat went quiet
    let last_activity = events
        .iter()
        .rev()
        .find(|e| e.event_type != EventType::Heartbeat);
    if let Some(activity) = last_activity {
        let heartbeat_ref = last_heartbeat.unwrap_or(activity.timestamp);
        if activity.event_type.implies_active_work() && now - heartbeat_ref > stuck_threshold {
            return AgentStatus::Stuck;
        }
    }

    // waiting_approval: a request without a subsequent receipt
    let last_approval = events.iter().rev().find(|e| {
        matches!(
            e.event_type,
            EventType::ApprovalRequested | EventType::ApprovalReceived
        )
    });
    if let Some(approval) = last_approval {
        if approval.event_type == EventType::ApprovalRequested {
            return AgentStatus::WaitingApproval;
        }
    }

    // error: the last task-scoped event is a failure and no new task started
    let last_task_event = events.iter().rev().find(|e| e.event_type.is_task_scoped());
    if let Some(task_event) = last_task_event {
        if task_event.event_type == EventType::TaskFailed {
            return AgentStatus::Error;
        }
    }

    // processing: an open task (started without a terminal event)
    if has_open_task(events) {
        return AgentStatus::Processing;
    }

    AgentStatus::Idle
}

fn has_open_task(events: &[Event]) -> bool {
    let mut open: HashSet<&str> = HashSet::new();
    for event in events {
        let Some(task_id) = event.task_id.as_deref() else {
            continue;
        };
        match event.event_type {
            EventType::TaskStarted => {
                open.insert(task_id);
            }
            EventType::TaskCompleted | EventType::TaskFailed => {
                open.remove(task_id);
            }
            _ => {}
        }
    }
    !open.is_empty()
}

/// Age of the last heartbeat in whole seconds, if one exists.
pub fn heartbeat_age_seconds(
    last_heartbeat: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<i64> {
    last_heartbeat.map(|h| (now - h).num_seconds().max(0))
}

/// Tracks which (tenant, agent) pairs already announced a stuck period, so
/// `agent.stuck` fires exactly once per contiguous period. The next
/// heartbeat clears the marker.
#[derive(Debug, Default)]
pub struct StuckTracker {
    fired: HashMap<(String, String), DateTime<Utc>>,
}

impl StuckTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the agent is currently stuck; returns true when this is
    /// the first observation of the current stuck period.
    pub fn should_fire(&mut self, tenant_id: &str, agent_id: &str, now: DateTime<Utc>) -> bool {
        let key = (tenant_id.to_string(), agent_id.to_string());
        match self.fired.get(&key) {
            Some(_) => false,
            None => {
                self.fired.insert(key, now);
                true
            }
        }
    }

    /// A fresh heartbeat ends the stuck period.
    pub fn clear(&mut self, tenant_id: &str, agent_id: &str) {
        self.fired
            .remove(&(tenant_id.to_string(), agent_id.to_string()));
    }

    pub fn is_fired(&self, tenant_id: &str, agent_id: &str) -> bool {
        self.fired
            .contains_key(&(tenant_id.to_string(), agent_id.to_string()))
    }
}
