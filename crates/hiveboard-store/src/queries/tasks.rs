use std::collections::HashMap;

use chrono::{DateTime, Utc};
use hiveboard_engine::{
    build_action_tree, build_error_chains, build_plan_overlay, derive_task_state, ActionNode,
    ErrorChain, PlanOverlay, TaskState,
};
use hiveboard_types::{Event, EventType, KeyType, PayloadData};
use serde::Serialize;

use crate::filter::{filter_events, paginate, EventFilter, Page};
use crate::pricing;
use crate::store::Store;

/// One row of `GET /v1/tasks`: a task reconstructed by grouping its events.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub agent_id: String,
    pub project_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub derived_status: TaskState,
    pub duration_ms: Option<u64>,
    pub total_cost: f64,
    pub llm_call_count: u64,
    pub total_tokens_in: u64,
    pub total_tokens_out: u64,
    pub event_count: usize,
}

/// Filters for task listings.
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    pub agent_id: Option<String>,
    pub project_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

/// Full task timeline: events ascending plus the derived overlays.
#[derive(Debug, Clone, Serialize)]
pub struct TaskTimeline {
    pub task_id: String,
    pub agent_id: String,
    pub derived_status: TaskState,
    pub events: Vec<Event>,
    pub action_tree: Vec<ActionNode>,
    pub error_chains: Vec<ErrorChain>,
    pub plan: Option<PlanOverlay>,
}

impl Store {
    /// Group events by (agent_id, task_id) and emit one row per task,
    /// newest started first.
    pub async fn list_tasks(
        &self,
        tenant_id: &str,
        viewer: KeyType,
        query: &TaskQuery,
    ) -> Page<TaskSummary> {
        let rows = self.tenant_events(tenant_id).await;
        let filter = EventFilter {
            agent_id: query.agent_id.clone(),
            project_id: query.project_id.clone(),
            since: query.since,
            until: query.until,
            ..EventFilter::default()
        };
        let events = filter_events(&rows, tenant_id, viewer, &filter, true);

        let mut grouped: HashMap<(String, String), Vec<Event>> = HashMap::new();
        for event in events {
            let Some(task_id) = event.task_id.clone() else {
                continue;
            };
            grouped
                .entry((event.agent_id.clone(), task_id))
                .or_default()
                .push(event);
        }

        let mut tasks: Vec<TaskSummary> = grouped
            .into_iter()
            .map(|((agent_id, task_id), task_events)| summarize(agent_id, task_id, &task_events))
            .collect();

        tasks.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        paginate(tasks, query.limit, query.cursor.as_deref())
    }

    /// Events for one task ascending, plus action tree, error chains and
    /// plan overlay.
    pub async fn get_timeline(
        &self,
        tenant_id: &str,
        viewer: KeyType,
        task_id: &str,
    ) -> Option<TaskTimeline> {
        let rows = self.tenant_events(tenant_id).await;
        let events = filter_events(&rows, tenant_id, viewer, &EventFilter::for_task(task_id), true);
        if events.is_empty() {
            return None;
        }

        let agent_id = events[0].agent_id.clone();
        Some(TaskTimeline {
            task_id: task_id.to_string(),
            agent_id,
            derived_status: derive_task_state(&events),
            action_tree: build_action_tree(&events),
            error_chains: build_error_chains(&events),
            plan: build_plan_overlay(&events),
            events,
        })
    }
}

fn summarize(agent_id: String, task_id: String, events: &[Event]) -> TaskSummary {
    let started_at = events
        .first()
        .map(|e| e.timestamp)
        .unwrap_or_else(Utc::now);

    let mut duration_ms = None;
    let mut total_cost = 0.0;
    let mut llm_call_count = 0;
    let mut total_tokens_in = 0;
    let mut total_tokens_out = 0;

    for event in events {
        if matches!(
            event.event_type,
            EventType::TaskCompleted | EventType::TaskFailed
        ) {
            if event.duration_ms.is_some() {
                duration_ms = event.duration_ms;
            }
        }
        if let Some(PayloadData::LlmCall(call)) = event.payload_data() {
            llm_call_count += 1;
            total_tokens_in += call.tokens_in.unwrap_or(0);
            total_tokens_out += call.tokens_out.unwrap_or(0);
            if let (Some(cost), _) = pricing::effective_cost(call) {
                total_cost += cost;
            }
        }
    }

    TaskSummary {
        agent_id,
        task_id,
        project_id: events.iter().find_map(|e| e.project_id.clone()),
        started_at,
        derived_status: derive_task_state(events),
        duration_ms,
        total_cost,
        llm_call_count,
        total_tokens_in,
        total_tokens_out,
        event_count: events.len(),
    }
}
