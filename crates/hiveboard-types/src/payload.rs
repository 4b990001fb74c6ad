use serde::{Deserialize, Serialize};
use serde_json::Value;

// NOTE: Payload Design Rationale
//
// payload.data is a kind-tagged discriminated union. Known kinds parse into
// typed structs whose fields are all optional: a missing field is an advisory
// warning at ingestion, never a rejection. Anything else (no kind, an
// unrecognized kind, or data that does not fit the kind's shape) lands in
// Unknown and round-trips verbatim, so older servers never drop payloads from
// newer SDKs.

/// Event payload: conventional kind, short summary, kind-shaped data, tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RawPayload", into = "RawPayload")]
pub struct Payload {
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub data: PayloadData,
}

/// Wire shape of a payload before kind dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawPayload {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    tags: Vec<String>,
}

impl From<RawPayload> for Payload {
    fn from(raw: RawPayload) -> Self {
        Payload {
            summary: raw.summary,
            tags: raw.tags,
            data: PayloadData::from_parts(raw.kind, raw.data),
        }
    }
}

impl From<Payload> for RawPayload {
    fn from(payload: Payload) -> Self {
        let (kind, data) = payload.data.to_parts();
        RawPayload {
            kind,
            summary: payload.summary,
            data,
            tags: payload.tags,
        }
    }
}

/// Typed payload data, one variant per conventional kind.
#[derive(Debug, Clone)]
pub enum PayloadData {
    LlmCall(LlmCallData),
    PlanCreated(PlanCreatedData),
    PlanStep(PlanStepData),
    QueueSnapshot(QueueSnapshotData),
    Todo(TodoData),
    Scheduled(ScheduledData),
    Issue(IssueData),
    /// Forward-compatibility: unrecognized kind or shape, kept verbatim
    Unknown {
        kind: Option<String>,
        data: Option<Value>,
    },
}

impl PayloadData {
    /// Parse the (kind, data) pair from the wire. Never fails; anything that
    /// does not match a known kind's shape becomes Unknown.
    pub fn from_parts(kind: Option<String>, data: Option<Value>) -> Self {
        let Some(kind_str) = kind.as_deref() else {
            return PayloadData::Unknown { kind, data };
        };

        let body = match &data {
            None => Value::Object(serde_json::Map::new()),
            Some(value) if value.is_object() => value.clone(),
            // A known kind with non-object data is not that kind's shape
            Some(_) => return PayloadData::Unknown { kind, data },
        };

        let parsed = match kind_str {
            "llm_call" => serde_json::from_value(body).map(PayloadData::LlmCall),
            "plan_created" => serde_json::from_value(body).map(PayloadData::PlanCreated),
            "plan_step" => serde_json::from_value(body).map(PayloadData::PlanStep),
            "queue_snapshot" => serde_json::from_value(body).map(PayloadData::QueueSnapshot),
            "todo" => serde_json::from_value(body).map(PayloadData::Todo),
            "scheduled" => serde_json::from_value(body).map(PayloadData::Scheduled),
            "issue" => serde_json::from_value(body).map(PayloadData::Issue),
            _ => return PayloadData::Unknown { kind, data },
        };

        parsed.unwrap_or(PayloadData::Unknown { kind, data })
    }

    /// Back to the wire shape.
    pub fn to_parts(&self) -> (Option<String>, Option<Value>) {
        fn body<T: Serialize>(value: &T) -> Option<Value> {
            serde_json::to_value(value).ok()
        }

        match self {
            PayloadData::LlmCall(d) => (Some("llm_call".to_string()), body(d)),
            PayloadData::PlanCreated(d) => (Some("plan_created".to_string()), body(d)),
            PayloadData::PlanStep(d) => (Some("plan_step".to_string()), body(d)),
            PayloadData::QueueSnapshot(d) => (Some("queue_snapshot".to_string()), body(d)),
            PayloadData::Todo(d) => (Some("todo".to_string()), body(d)),
            PayloadData::Scheduled(d) => (Some("scheduled".to_string()), body(d)),
            PayloadData::Issue(d) => (Some("issue".to_string()), body(d)),
            PayloadData::Unknown { kind, data } => (kind.clone(), data.clone()),
        }
    }

    pub fn kind(&self) -> Option<&str> {
        match self {
            PayloadData::LlmCall(_) => Some("llm_call"),
            PayloadData::PlanCreated(_) => Some("plan_created"),
            PayloadData::PlanStep(_) => Some("plan_step"),
            PayloadData::QueueSnapshot(_) => Some("queue_snapshot"),
            PayloadData::Todo(_) => Some("todo"),
            PayloadData::Scheduled(_) => Some("scheduled"),
            PayloadData::Issue(_) => Some("issue"),
            PayloadData::Unknown { kind, .. } => kind.as_deref(),
        }
    }

    /// Severity refinement for `custom` events carrying a known kind.
    pub fn default_severity(&self) -> Option<crate::Severity> {
        match self {
            PayloadData::LlmCall(_) => Some(crate::Severity::Info),
            PayloadData::Issue(_) => Some(crate::Severity::Warn),
            PayloadData::QueueSnapshot(_) => Some(crate::Severity::Debug),
            PayloadData::PlanCreated(_) | PayloadData::PlanStep(_) => Some(crate::Severity::Info),
            PayloadData::Todo(_) | PayloadData::Scheduled(_) => Some(crate::Severity::Info),
            PayloadData::Unknown { .. } => None,
        }
    }

    /// Conventional fields that should be present for this kind. Used to
    /// produce advisory warnings at ingestion; never causes a rejection.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        match self {
            PayloadData::LlmCall(d) => {
                if d.model.is_none() {
                    missing.push("model");
                }
                if d.tokens_in.is_none() {
                    missing.push("tokens_in");
                }
                if d.tokens_out.is_none() {
                    missing.push("tokens_out");
                }
            }
            PayloadData::PlanCreated(d) => {
                if d.goal.is_none() {
                    missing.push("goal");
                }
                if d.steps.is_empty() {
                    missing.push("steps");
                }
            }
            PayloadData::PlanStep(d) => {
                if d.step_index.is_none() {
                    missing.push("step_index");
                }
                if d.action.is_none() {
                    missing.push("action");
                }
            }
            PayloadData::QueueSnapshot(d) => {
                if d.depth.is_none() {
                    missing.push("depth");
                }
            }
            PayloadData::Todo(d) => {
                if d.todo_id.is_none() {
                    missing.push("todo_id");
                }
                if d.action.is_none() {
                    missing.push("action");
                }
            }
            PayloadData::Scheduled(d) => {
                if d.items.is_empty() {
                    missing.push("items");
                }
            }
            PayloadData::Issue(d) => {
                if d.issue_id.is_none() {
                    missing.push("issue_id");
                }
                if d.action.is_none() {
                    missing.push("action");
                }
            }
            PayloadData::Unknown { .. } => {}
        }
        missing
    }
}

/// One LLM request/response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmCallData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub tokens_in: Option<u64>,
    #[serde(default)]
    pub tokens_out: Option<u64>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub prompt_preview: Option<String>,
    #[serde(default)]
    pub response_preview: Option<String>,
}

/// Task-level plan snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanCreatedData {
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub revision: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStepAction {
    Started,
    Completed,
    Failed,
    Skipped,
}

/// Per-step plan transition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanStepData {
    #[serde(default)]
    pub step_index: Option<usize>,
    #[serde(default)]
    pub total_steps: Option<usize>,
    #[serde(default)]
    pub action: Option<PlanStepAction>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Agent's pending-work queue at an instant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueSnapshotData {
    #[serde(default)]
    pub depth: Option<u64>,
    #[serde(default)]
    pub items: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoAction {
    Created,
    Completed,
    Failed,
    Dismissed,
    Deferred,
}

/// Manual work item transition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TodoData {
    #[serde(default)]
    pub todo_id: Option<String>,
    #[serde(default)]
    pub action: Option<TodoAction>,
    #[serde(default)]
    pub title: Option<String>,
}

/// One recurring schedule entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduledItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub next_run: Option<String>,
    #[serde(default)]
    pub interval: Option<Value>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub last_status: Option<String>,
}

/// Recurring schedules snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduledData {
    #[serde(default)]
    pub items: Vec<ScheduledItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueAction {
    Reported,
    Resolved,
}

/// Operational issue transition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueData {
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub action: Option<IssueAction>,
    #[serde(default)]
    pub issue_id: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub occurrence_count: Option<u64>,
}
