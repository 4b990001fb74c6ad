use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::KeyType;
use crate::payload::{Payload, PayloadData};

// NOTE: Schema Design Goals
//
// 1. The event is the only canonical primitive. Agent status, task timelines,
//    action trees, plan overlays and pipeline views are all reconstructed from
//    the stream at query time; the agents table is a cache, never a source of
//    truth.
// 2. event_type stays structural (13 kinds). Rich semantics ride on
//    payload.kind so new instrumentation never needs a schema change.
// 3. (tenant_id, event_id) uniqueness makes client retries idempotent.

/// Type of agent event (the 13 canonical kinds)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AgentRegistered,
    Heartbeat,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    ActionStarted,
    ActionCompleted,
    ActionFailed,
    RetryStarted,
    Escalated,
    ApprovalRequested,
    ApprovalReceived,
    Custom,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::AgentRegistered => "agent_registered",
            EventType::Heartbeat => "heartbeat",
            EventType::TaskStarted => "task_started",
            EventType::TaskCompleted => "task_completed",
            EventType::TaskFailed => "task_failed",
            EventType::ActionStarted => "action_started",
            EventType::ActionCompleted => "action_completed",
            EventType::ActionFailed => "action_failed",
            EventType::RetryStarted => "retry_started",
            EventType::Escalated => "escalated",
            EventType::ApprovalRequested => "approval_requested",
            EventType::ApprovalReceived => "approval_received",
            EventType::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "agent_registered" => Some(EventType::AgentRegistered),
            "heartbeat" => Some(EventType::Heartbeat),
            "task_started" => Some(EventType::TaskStarted),
            "task_completed" => Some(EventType::TaskCompleted),
            "task_failed" => Some(EventType::TaskFailed),
            "action_started" => Some(EventType::ActionStarted),
            "action_completed" => Some(EventType::ActionCompleted),
            "action_failed" => Some(EventType::ActionFailed),
            "retry_started" => Some(EventType::RetryStarted),
            "escalated" => Some(EventType::Escalated),
            "approval_requested" => Some(EventType::ApprovalRequested),
            "approval_received" => Some(EventType::ApprovalReceived),
            "custom" => Some(EventType::Custom),
            _ => None,
        }
    }

    /// Default severity when the client did not supply one.
    /// For `custom` events the payload kind refines this further.
    pub fn default_severity(&self) -> Severity {
        match self {
            EventType::Heartbeat => Severity::Debug,
            EventType::TaskFailed | EventType::ActionFailed | EventType::Escalated => {
                Severity::Error
            }
            EventType::ApprovalRequested | EventType::ApprovalReceived => Severity::Warn,
            _ => Severity::Info,
        }
    }

    /// Whether this event type references a task (carries task_id semantics).
    pub fn is_task_scoped(&self) -> bool {
        matches!(
            self,
            EventType::TaskStarted | EventType::TaskCompleted | EventType::TaskFailed
        )
    }

    /// Whether an agent whose latest activity is this event should be
    /// considered mid-work for stuck detection.
    pub fn implies_active_work(&self) -> bool {
        matches!(self, EventType::TaskStarted | EventType::ActionStarted)
    }
}

/// Event severity. Ordering matters: subscription filters use
/// `min_severity` with debug < info < warn < error.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debug" => Some(Severity::Debug),
            "info" => Some(Severity::Info),
            "warn" => Some(Severity::Warn),
            "error" => Some(Severity::Error),
            _ => None,
        }
    }
}

/// Outcome attached to completion-type events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Success,
    Failure,
    Timeout,
    Escalated,
    Cancelled,
}

impl EventStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(EventStatus::Success),
            "failure" => Some(EventStatus::Failure),
            "timeout" => Some(EventStatus::Timeout),
            "escalated" => Some(EventStatus::Escalated),
            "cancelled" => Some(EventStatus::Cancelled),
            _ => None,
        }
    }
}

/// Canonical event row. Immutable once written; destroyed only by pruning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique per (tenant_id, event_id); used for dedup
    pub event_id: Uuid,

    /// Set by ingestion from the authenticated key
    pub tenant_id: String,

    /// Key type of the submitting key; drives test/live visibility
    pub key_type: KeyType,

    /// Client-supplied, canonicalized to UTC
    pub timestamp: DateTime<Utc>,

    pub event_type: EventType,
    pub severity: Severity,
    pub status: Option<EventStatus>,

    pub agent_id: String,
    pub project_id: Option<String>,
    pub task_id: Option<String>,
    pub action_id: Option<String>,
    pub parent_action_id: Option<String>,

    // Inherited from the batch envelope when absent on the event
    pub environment: Option<String>,
    pub group: Option<String>,
    pub agent_type: Option<String>,
    pub agent_version: Option<String>,
    pub framework: Option<String>,
    pub sdk_version: Option<String>,

    /// Present on completion-type events
    pub duration_ms: Option<u64>,

    pub payload: Option<Payload>,
}

impl Event {
    /// Payload kind string, if the event carries a payload with one.
    pub fn payload_kind(&self) -> Option<&str> {
        self.payload.as_ref().and_then(|p| p.data.kind())
    }

    /// Typed view of the payload data, if any.
    pub fn payload_data(&self) -> Option<&PayloadData> {
        self.payload.as_ref().map(|p| &p.data)
    }
}
