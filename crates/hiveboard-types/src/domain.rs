use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::event::{EventType, Severity};

/// Billing plan; also determines the event retention window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Pro,
    Enterprise,
}

impl PlanTier {
    pub fn retention_days(&self) -> i64 {
        match self {
            PlanTier::Free => 7,
            PlanTier::Pro => 30,
            PlanTier::Enterprise => 90,
        }
    }
}

/// Billing and data-isolation unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub tenant_id: String,
    pub name: String,
    pub plan: PlanTier,
    pub created_at: DateTime<Utc>,
}

/// Scope of an API key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    Live,
    Test,
    Read,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Live => "live",
            KeyType::Test => "test",
            KeyType::Read => "read",
        }
    }

    /// Whether queries authenticated with this key see events tagged `test`.
    /// Test keys see everything; live and read keys see only live data.
    pub fn sees_test_data(&self) -> bool {
        matches!(self, KeyType::Test)
    }
}

/// Bearer credential scoped to a tenant. Only the SHA-256 of the raw key is
/// stored; the raw key is shown to the user exactly once at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub key_id: String,
    pub tenant_id: String,
    pub key_hash: String,
    pub key_type: KeyType,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// Digest a raw bearer key for storage or lookup.
    pub fn hash_raw(raw: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(raw.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Slug of the implicit project every tenant has. Cannot be deleted.
pub const DEFAULT_PROJECT_SLUG: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Open,
    Archived,
}

/// Named namespace within a tenant; slug unique per tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    pub tenant_id: String,
    pub slug: String,
    pub name: String,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
}

/// Derived agent status, computed at query time from the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Processing,
    WaitingApproval,
    Error,
    Stuck,
    Offline,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Processing => "processing",
            AgentStatus::WaitingApproval => "waiting_approval",
            AgentStatus::Error => "error",
            AgentStatus::Stuck => "stuck",
            AgentStatus::Offline => "offline",
        }
    }

    /// Rank for `sort=attention`: the more an operator should care, the
    /// lower the rank.
    pub fn attention_rank(&self) -> u8 {
        match self {
            AgentStatus::Stuck => 0,
            AgentStatus::Error => 1,
            AgentStatus::WaitingApproval => 2,
            AgentStatus::Processing => 3,
            AgentStatus::Idle => 4,
            AgentStatus::Offline => 5,
        }
    }
}

/// Cache row keyed by (tenant_id, agent_id). An accelerator, never a source
/// of truth: everything here is derivable from the event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub tenant_id: String,
    pub agent_id: String,
    pub agent_type: Option<String>,
    pub agent_version: Option<String>,
    pub framework: Option<String>,
    pub environment: Option<String>,
    pub group: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub last_event_type: Option<EventType>,
    pub last_task_id: Option<String>,
    pub last_project_id: Option<String>,
    pub previous_status: Option<AgentStatus>,
}

/// Many-to-many (tenant, project, agent) membership, auto-populated on ingest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectAgent {
    pub tenant_id: String,
    pub project_id: String,
    pub agent_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertConditionType {
    /// Count of matching events in the batch crosses a threshold
    EventCount,
    /// failed / (completed + failed) ratio crosses a threshold
    ErrorRate,
    /// Summed llm_call cost in the batch crosses a threshold
    CostThreshold,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub rule_id: String,
    pub tenant_id: String,
    pub name: String,
    pub condition_type: AlertConditionType,
    pub condition_params: serde_json::Value,
    pub severity: Severity,
    pub channels: Vec<String>,
    pub enabled: bool,
}

/// Append-only record of a rule firing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertHistoryEntry {
    pub event_id: Uuid,
    pub rule_id: String,
    pub tenant_id: String,
    pub fired_at: DateTime<Utc>,
    pub triggering_event_ids: Vec<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_days_per_plan() {
        assert_eq!(PlanTier::Free.retention_days(), 7);
        assert_eq!(PlanTier::Pro.retention_days(), 30);
        assert_eq!(PlanTier::Enterprise.retention_days(), 90);
    }

    #[test]
    fn test_key_hash_is_stable_hex() {
        let a = ApiKey::hash_raw("hb_live_abc123");
        let b = ApiKey::hash_raw("hb_live_abc123");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, ApiKey::hash_raw("hb_live_abc124"));
    }

    #[test]
    fn test_test_key_visibility() {
        assert!(KeyType::Test.sees_test_data());
        assert!(!KeyType::Live.sees_test_data());
        assert!(!KeyType::Read.sees_test_data());
    }

    #[test]
    fn test_attention_ordering() {
        assert!(AgentStatus::Stuck.attention_rank() < AgentStatus::Error.attention_rank());
        assert!(AgentStatus::Error.attention_rank() < AgentStatus::Idle.attention_rank());
        assert!(AgentStatus::Idle.attention_rank() < AgentStatus::Offline.attention_rank());
    }
}
