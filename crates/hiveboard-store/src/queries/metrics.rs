use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use hiveboard_types::{Event, EventType, KeyType, PayloadData, Severity};
use serde::Serialize;

use crate::filter::{filter_events, EventFilter};
use crate::pricing;
use crate::store::Store;

/// Dimension for metric rollups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Agent,
    Model,
}

/// Whole-window totals.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSummary {
    pub event_count: usize,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub success_rate: Option<f64>,
    pub avg_duration_ms: Option<f64>,
    pub error_count: u64,
    pub total_cost: f64,
    pub total_tokens_in: u64,
    pub total_tokens_out: u64,
}

/// One timeseries bucket.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsBucket {
    pub timestamp: DateTime<Utc>,
    pub event_count: usize,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub error_count: u64,
    pub cost: f64,
}

/// Per-group rollup when `group_by` is requested.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GroupRollup {
    pub key: String,
    pub event_count: usize,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub total_cost: f64,
    pub total_tokens_in: u64,
    pub total_tokens_out: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub summary: MetricsSummary,
    pub timeseries: Vec<MetricsBucket>,
    pub groups: Option<Vec<GroupRollup>>,
}

impl Store {
    /// Summary plus bucketed timeseries over `[now - range, now]`; adds
    /// per-agent or per-model rollups when `group_by` is set.
    pub async fn get_metrics(
        &self,
        tenant_id: &str,
        viewer: KeyType,
        range: Duration,
        interval: Duration,
        group_by: Option<GroupBy>,
        now: DateTime<Utc>,
    ) -> MetricsReport {
        let window_start = now - range;
        let rows = self.tenant_events(tenant_id).await;
        let filter = EventFilter {
            since: Some(window_start),
            until: Some(now),
            ..EventFilter::default()
        };
        let events = filter_events(&rows, tenant_id, viewer, &filter, true);

        let summary = summarize(&events);
        let timeseries = bucketize(&events, window_start, now, interval);
        let groups = group_by.map(|dimension| rollup(&events, dimension));

        MetricsReport {
            summary,
            timeseries,
            groups,
        }
    }
}

fn summarize(events: &[Event]) -> MetricsSummary {
    let mut summary = MetricsSummary {
        event_count: events.len(),
        ..MetricsSummary::default()
    };
    let mut durations: Vec<u64> = Vec::new();

    for event in events {
        match event.event_type {
            EventType::TaskCompleted => {
                summary.tasks_completed += 1;
                if let Some(duration) = event.duration_ms {
                    durations.push(duration);
                }
            }
            EventType::TaskFailed => summary.tasks_failed += 1,
            _ => {}
        }
        if event.severity == Severity::Error {
            summary.error_count += 1;
        }
        if let Some(PayloadData::LlmCall(call)) = event.payload_data() {
            summary.total_tokens_in += call.tokens_in.unwrap_or(0);
            summary.total_tokens_out += call.tokens_out.unwrap_or(0);
            if let (Some(cost), _) = pricing::effective_cost(call) {
                summary.total_cost += cost;
            }
        }
    }

    let finished = summary.tasks_completed + summary.tasks_failed;
    if finished > 0 {
        summary.success_rate = Some(summary.tasks_completed as f64 / finished as f64);
    }
    if !durations.is_empty() {
        summary.avg_duration_ms =
            Some(durations.iter().sum::<u64>() as f64 / durations.len() as f64);
    }
    summary
}

fn bucketize(
    events: &[Event],
    window_start: DateTime<Utc>,
    now: DateTime<Utc>,
    interval: Duration,
) -> Vec<MetricsBucket> {
    let interval_secs = interval.num_seconds().max(1);
    let window_secs = (now - window_start).num_seconds().max(0);
    let bucket_count = (window_secs as f64 / interval_secs as f64).ceil() as usize;

    let mut buckets: Vec<MetricsBucket> = (0..bucket_count)
        .map(|i| MetricsBucket {
            timestamp: window_start + Duration::seconds(i as i64 * interval_secs),
            event_count: 0,
            tasks_completed: 0,
            tasks_failed: 0,
            error_count: 0,
            cost: 0.0,
        })
        .collect();

    for event in events {
        let offset = (event.timestamp - window_start).num_seconds();
        if offset < 0 {
            continue;
        }
        let index = (offset / interval_secs) as usize;
        let Some(bucket) = buckets.get_mut(index.min(bucket_count.saturating_sub(1))) else {
            continue;
        };
        bucket.event_count += 1;
        match event.event_type {
            EventType::TaskCompleted => bucket.tasks_completed += 1,
            EventType::TaskFailed => bucket.tasks_failed += 1,
            _ => {}
        }
        if event.severity == Severity::Error {
            bucket.error_count += 1;
        }
        if let Some(PayloadData::LlmCall(call)) = event.payload_data() {
            if let (Some(cost), _) = pricing::effective_cost(call) {
                bucket.cost += cost;
            }
        }
    }
    buckets
}

fn rollup(events: &[Event], dimension: GroupBy) -> Vec<GroupRollup> {
    let mut groups: HashMap<String, GroupRollup> = HashMap::new();

    for event in events {
        let key = match dimension {
            GroupBy::Agent => Some(event.agent_id.clone()),
            GroupBy::Model => match event.payload_data() {
                Some(PayloadData::LlmCall(call)) => call.model.clone(),
                _ => None,
            },
        };
        let Some(key) = key else { continue };

        let group = groups.entry(key.clone()).or_insert_with(|| GroupRollup {
            key,
            ..GroupRollup::default()
        });
        group.event_count += 1;
        match event.event_type {
            EventType::TaskCompleted => group.tasks_completed += 1,
            EventType::TaskFailed => group.tasks_failed += 1,
            _ => {}
        }
        if let Some(PayloadData::LlmCall(call)) = event.payload_data() {
            group.total_tokens_in += call.tokens_in.unwrap_or(0);
            group.total_tokens_out += call.tokens_out.unwrap_or(0);
            if let (Some(cost), _) = pricing::effective_cost(call) {
                group.total_cost += cost;
            }
        }
    }

    let mut rollups: Vec<GroupRollup> = groups.into_values().collect();
    rollups.sort_by(|a, b| {
        b.total_cost
            .partial_cmp(&a.total_cost)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.key.cmp(&b.key))
    });
    rollups
}
