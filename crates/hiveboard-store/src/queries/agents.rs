use chrono::{DateTime, Duration, Utc};
use hiveboard_engine::{derive_status, heartbeat_age_seconds};
use hiveboard_types::{
    AgentRecord, AgentStatus, Event, EventType, KeyType, PayloadData,
    AGENT_STATS_WINDOW_SECONDS,
};
use serde::Serialize;

use crate::filter::visible_to;
use crate::pricing;
use crate::store::{agent_stream, Store};

/// Rolling one-hour activity stats for an agent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentStats1h {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub success_rate: Option<f64>,
    pub avg_duration_ms: Option<f64>,
    pub total_cost: f64,
    pub tasks_per_hour: f64,
}

/// One row of `GET /v1/agents`: the cache record joined with the derived
/// status and the rolling stats.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub agent_id: String,
    pub agent_type: Option<String>,
    pub agent_version: Option<String>,
    pub framework: Option<String>,
    pub environment: Option<String>,
    pub group: Option<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub heartbeat_age_seconds: Option<i64>,
    pub last_event_type: Option<EventType>,
    pub current_task_id: Option<String>,
    pub current_project_id: Option<String>,
    pub derived_status: AgentStatus,
    pub stats_1h: AgentStats1h,
}

/// Filters for agent listings.
#[derive(Debug, Clone, Default)]
pub struct AgentQuery {
    pub environment: Option<String>,
    pub group: Option<String>,
    pub project_id: Option<String>,
    /// Sort agents needing an operator's eye first
    pub sort_attention: bool,
}

impl Store {
    /// List the tenant's agents with derived status and rolling stats.
    pub async fn list_agents(
        &self,
        tenant_id: &str,
        viewer: KeyType,
        query: &AgentQuery,
        now: DateTime<Utc>,
        stuck_threshold: Duration,
    ) -> Vec<AgentSummary> {
        let events = self.tenant_events(tenant_id).await;
        let mut records = self.list_agent_records(tenant_id).await;

        if let Some(environment) = &query.environment {
            records.retain(|r| r.environment.as_ref() == Some(environment));
        }
        if let Some(group) = &query.group {
            records.retain(|r| r.group.as_ref() == Some(group));
        }
        if let Some(project_id) = &query.project_id {
            let members = self.agents_in_project(tenant_id, project_id).await;
            records.retain(|r| members.contains(&r.agent_id));
        }

        let mut summaries: Vec<AgentSummary> = records
            .into_iter()
            .map(|record| summarize(&events, record, viewer, now, stuck_threshold))
            .collect();

        if query.sort_attention {
            summaries.sort_by_key(|s| (s.derived_status.attention_rank(), s.agent_id.clone()));
        } else {
            summaries.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        }
        summaries
    }

    pub async fn get_agent(
        &self,
        tenant_id: &str,
        viewer: KeyType,
        agent_id: &str,
        now: DateTime<Utc>,
        stuck_threshold: Duration,
    ) -> Option<AgentSummary> {
        let record = self.get_agent_record(tenant_id, agent_id).await?;
        let events = self.tenant_events(tenant_id).await;
        Some(summarize(&events, record, viewer, now, stuck_threshold))
    }

    /// Stats over `[now - 1h, now]` for one agent.
    pub async fn compute_agent_stats_1h(
        &self,
        tenant_id: &str,
        viewer: KeyType,
        agent_id: &str,
        now: DateTime<Utc>,
    ) -> AgentStats1h {
        let events = self.tenant_events(tenant_id).await;
        let stream = agent_stream(&events, tenant_id, agent_id);
        stats_1h(&stream, viewer, now)
    }
}

fn summarize(
    tenant_events: &[Event],
    record: AgentRecord,
    viewer: KeyType,
    now: DateTime<Utc>,
    stuck_threshold: Duration,
) -> AgentSummary {
    let stream = agent_stream(tenant_events, &record.tenant_id, &record.agent_id);
    let derived_status = derive_status(&stream, record.last_heartbeat, now, stuck_threshold);
    let stats_1h = stats_1h(&stream, viewer, now);

    AgentSummary {
        agent_id: record.agent_id,
        agent_type: record.agent_type,
        agent_version: record.agent_version,
        framework: record.framework,
        environment: record.environment,
        group: record.group,
        first_seen: record.first_seen,
        last_seen: record.last_seen,
        last_heartbeat: record.last_heartbeat,
        heartbeat_age_seconds: heartbeat_age_seconds(record.last_heartbeat, now),
        last_event_type: record.last_event_type,
        current_task_id: record.last_task_id,
        current_project_id: record.last_project_id,
        derived_status,
        stats_1h,
    }
}

fn stats_1h(stream: &[Event], viewer: KeyType, now: DateTime<Utc>) -> AgentStats1h {
    let window_start = now - Duration::seconds(AGENT_STATS_WINDOW_SECONDS);
    let mut stats = AgentStats1h::default();
    let mut durations: Vec<u64> = Vec::new();

    for event in stream {
        if event.timestamp < window_start || event.timestamp > now {
            continue;
        }
        if !visible_to(event, viewer) {
            continue;
        }
        match event.event_type {
            EventType::TaskCompleted => {
                stats.tasks_completed += 1;
                if let Some(duration) = event.duration_ms {
                    durations.push(duration);
                }
            }
            EventType::TaskFailed => {
                stats.tasks_failed += 1;
            }
            _ => {}
        }
        if let Some(PayloadData::LlmCall(call)) = event.payload_data() {
            if let (Some(cost), _) = pricing::effective_cost(call) {
                stats.total_cost += cost;
            }
        }
    }

    let finished = stats.tasks_completed + stats.tasks_failed;
    if finished > 0 {
        stats.success_rate = Some(stats.tasks_completed as f64 / finished as f64);
    }
    if !durations.is_empty() {
        stats.avg_duration_ms =
            Some(durations.iter().sum::<u64>() as f64 / durations.len() as f64);
    }
    stats.tasks_per_hour = stats.tasks_completed as f64;
    stats
}
