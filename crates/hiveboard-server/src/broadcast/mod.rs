use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hiveboard_types::{AgentStatus, Event, Severity};
use serde::{Deserialize, Serialize};

mod bridge;
mod native;

pub use bridge::BridgeBus;
pub use native::NativeBus;

// The two back-ends are contract-identical: ingestion holds one
// `Arc<dyn Broadcaster>` and never knows whether sockets terminate in this
// process or behind the gateway.

/// Fan-out surface the ingestion pipeline calls into.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Deliver accepted events to matching `events`-channel subscriptions.
    async fn broadcast_events(&self, tenant_id: &str, events: &[Event]);

    /// Announce a derived-status transition on the `agents` channel.
    async fn broadcast_agent_status_change(&self, tenant_id: &str, change: &StatusChange);

    /// Announce the start of a stuck period (once per period).
    async fn broadcast_agent_stuck(&self, tenant_id: &str, notice: &StuckNotice);

    /// A fresh heartbeat ended the stuck period.
    async fn clear_stuck(&self, tenant_id: &str, agent_id: &str);
}

/// Server → subscriber message shapes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    #[serde(rename = "event.new")]
    EventNew(Event),
    #[serde(rename = "agent.status_changed")]
    AgentStatusChanged(StatusChange),
    #[serde(rename = "agent.stuck")]
    AgentStuck(StuckNotice),
    #[serde(rename = "agent.stuck_cleared")]
    AgentStuckCleared { agent_id: String },
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "pong")]
    Pong,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub agent_id: String,
    pub previous_status: AgentStatus,
    pub new_status: AgentStatus,
    pub current_task_id: Option<String>,
    pub current_project_id: Option<String>,
    pub heartbeat_age_seconds: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StuckNotice {
    pub agent_id: String,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub stuck_threshold_seconds: u64,
    pub task_id: Option<String>,
}

/// Message a dashboard sends over the stream (either transport).
#[derive(Debug, Clone, Deserialize)]
pub struct ClientMessage {
    pub action: ClientAction,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub filters: Option<SubscriptionFilters>,
    /// Present so a gateway-forwarded message can re-authenticate against a
    /// cold server.
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAction {
    Subscribe,
    Unsubscribe,
    Ping,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionFilters {
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub min_severity: Option<Severity>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub payload_kind: Option<String>,
}

/// A dashboard's interest set: channels plus event filters.
#[derive(Debug, Clone, Default)]
pub struct Subscription {
    pub events: bool,
    pub agents: bool,
    pub filters: SubscriptionFilters,
}

impl Subscription {
    pub fn subscribe(&mut self, channels: &[String], filters: Option<SubscriptionFilters>) {
        for channel in channels {
            match channel.as_str() {
                "events" => self.events = true,
                "agents" => self.agents = true,
                _ => {}
            }
        }
        if let Some(filters) = filters {
            self.filters = filters;
        }
    }

    pub fn unsubscribe(&mut self, channels: &[String]) {
        for channel in channels {
            match channel.as_str() {
                "events" => self.events = false,
                "agents" => self.agents = false,
                _ => {}
            }
        }
    }

    /// `event.new` goes to this subscription when the events channel is on
    /// and every filter matches.
    pub fn matches_event(&self, event: &Event) -> bool {
        if !self.events {
            return false;
        }
        let filters = &self.filters;
        if let Some(environment) = &filters.environment {
            if event.environment.as_ref() != Some(environment) {
                return false;
            }
        }
        if let Some(min_severity) = filters.min_severity {
            if event.severity < min_severity {
                return false;
            }
        }
        if let Some(agent_id) = &filters.agent_id {
            if &event.agent_id != agent_id {
                return false;
            }
        }
        if let Some(payload_kind) = &filters.payload_kind {
            if event.payload_kind() != Some(payload_kind.as_str()) {
                return false;
            }
        }
        true
    }

    pub fn wants_agent_messages(&self) -> bool {
        self.agents
    }
}
