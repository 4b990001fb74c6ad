use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use hiveboard_types::{Event, KeyType, PayloadData};
use serde::Serialize;
use uuid::Uuid;

use crate::filter::{filter_events, paginate, EventFilter, Page};
use crate::pricing;
use crate::store::Store;

/// One row of a cost breakdown (per agent or per model).
#[derive(Debug, Clone, Default, Serialize)]
pub struct CostBreakdownRow {
    pub key: String,
    pub call_count: u64,
    pub cost: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// Whole-window cost totals with breakdowns.
#[derive(Debug, Clone, Serialize)]
pub struct CostSummary {
    pub total_cost: f64,
    pub total_tokens_in: u64,
    pub total_tokens_out: u64,
    pub total_calls: u64,
    /// True when any reported cost had to be estimated from the price table
    pub estimated: bool,
    pub by_agent: Vec<CostBreakdownRow>,
    pub by_model: Vec<CostBreakdownRow>,
}

/// One individual llm_call for the cost drill-down.
#[derive(Debug, Clone, Serialize)]
pub struct CostCall {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub task_id: Option<String>,
    pub name: Option<String>,
    pub model: Option<String>,
    pub tokens_in: Option<u64>,
    pub tokens_out: Option<u64>,
    pub cost: Option<f64>,
    pub estimated: bool,
    pub duration_ms: Option<u64>,
    pub prompt_preview: Option<String>,
    pub response_preview: Option<String>,
}

/// Ordering for the call drill-down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostCallOrder {
    Cost,
    Newest,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostBucket {
    pub timestamp: DateTime<Utc>,
    pub cost: f64,
    pub call_count: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// One model's bucket series when split_by_model is requested.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSeries {
    pub model: String,
    pub buckets: Vec<CostBucket>,
}

impl Store {
    /// Totals and by_agent / by_model breakdowns over `[now - range, now]`.
    pub async fn get_cost_summary(
        &self,
        tenant_id: &str,
        viewer: KeyType,
        range: Duration,
        now: DateTime<Utc>,
    ) -> CostSummary {
        let calls = self.llm_calls_in_window(tenant_id, viewer, range, now).await;

        let mut summary = CostSummary {
            total_cost: 0.0,
            total_tokens_in: 0,
            total_tokens_out: 0,
            total_calls: 0,
            estimated: false,
            by_agent: Vec::new(),
            by_model: Vec::new(),
        };

        let mut by_agent: HashMap<String, CostBreakdownRow> = HashMap::new();
        let mut by_model: HashMap<String, CostBreakdownRow> = HashMap::new();

        for call in &calls {
            summary.total_calls += 1;
            summary.total_tokens_in += call.tokens_in.unwrap_or(0);
            summary.total_tokens_out += call.tokens_out.unwrap_or(0);
            summary.total_cost += call.cost.unwrap_or(0.0);
            summary.estimated |= call.estimated;

            accumulate(&mut by_agent, call.agent_id.clone(), call);
            if let Some(model) = call.model.clone() {
                accumulate(&mut by_model, model, call);
            }
        }

        summary.by_agent = sorted_rows(by_agent);
        summary.by_model = sorted_rows(by_model);
        summary
    }

    /// Individual llm_call events, ordered by cost or newest first.
    pub async fn get_cost_calls(
        &self,
        tenant_id: &str,
        viewer: KeyType,
        filter: &EventFilter,
        order: CostCallOrder,
        limit: Option<usize>,
        cursor: Option<&str>,
    ) -> Page<CostCall> {
        let rows = self.tenant_events(tenant_id).await;
        let mut scoped = filter.clone();
        scoped.payload_kind = Some("llm_call".to_string());
        let events = filter_events(&rows, tenant_id, viewer, &scoped, false);

        let mut calls: Vec<CostCall> = events.iter().filter_map(cost_call).collect();
        match order {
            CostCallOrder::Newest => {} // filter_events already sorted descending
            CostCallOrder::Cost => calls.sort_by(|a, b| {
                b.cost
                    .unwrap_or(0.0)
                    .partial_cmp(&a.cost.unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal)
            }),
        }
        paginate(calls, limit, cursor)
    }

    /// Cost timeseries over `[now - range, now]`, optionally one series per
    /// model.
    pub async fn get_cost_timeseries(
        &self,
        tenant_id: &str,
        viewer: KeyType,
        range: Duration,
        interval: Duration,
        split_by_model: bool,
        now: DateTime<Utc>,
    ) -> (Vec<CostBucket>, Option<Vec<ModelSeries>>) {
        let calls = self.llm_calls_in_window(tenant_id, viewer, range, now).await;
        let window_start = now - range;

        let total = bucketize(&calls, window_start, now, interval);
        if !split_by_model {
            return (total, None);
        }

        let mut per_model: HashMap<String, Vec<CostCall>> = HashMap::new();
        for call in calls {
            let Some(model) = call.model.clone() else {
                continue;
            };
            per_model.entry(model).or_default().push(call);
        }

        let mut series: Vec<ModelSeries> = per_model
            .into_iter()
            .map(|(model, calls)| ModelSeries {
                model,
                buckets: bucketize(&calls, window_start, now, interval),
            })
            .collect();
        series.sort_by(|a, b| a.model.cmp(&b.model));

        (total, Some(series))
    }

    async fn llm_calls_in_window(
        &self,
        tenant_id: &str,
        viewer: KeyType,
        range: Duration,
        now: DateTime<Utc>,
    ) -> Vec<CostCall> {
        let rows = self.tenant_events(tenant_id).await;
        let filter = EventFilter {
            payload_kind: Some("llm_call".to_string()),
            since: Some(now - range),
            until: Some(now),
            ..EventFilter::default()
        };
        let events = filter_events(&rows, tenant_id, viewer, &filter, true);
        events.iter().filter_map(cost_call).collect()
    }
}

fn cost_call(event: &Event) -> Option<CostCall> {
    let Some(PayloadData::LlmCall(call)) = event.payload_data() else {
        return None;
    };
    let (cost, estimated) = pricing::effective_cost(call);
    Some(CostCall {
        event_id: event.event_id,
        timestamp: event.timestamp,
        agent_id: event.agent_id.clone(),
        task_id: event.task_id.clone(),
        name: call.name.clone(),
        model: call.model.clone(),
        tokens_in: call.tokens_in,
        tokens_out: call.tokens_out,
        cost,
        estimated,
        duration_ms: call.duration_ms.or(event.duration_ms),
        prompt_preview: call.prompt_preview.clone(),
        response_preview: call.response_preview.clone(),
    })
}

fn accumulate(rows: &mut HashMap<String, CostBreakdownRow>, key: String, call: &CostCall) {
    let row = rows.entry(key.clone()).or_insert_with(|| CostBreakdownRow {
        key,
        ..CostBreakdownRow::default()
    });
    row.call_count += 1;
    row.cost += call.cost.unwrap_or(0.0);
    row.tokens_in += call.tokens_in.unwrap_or(0);
    row.tokens_out += call.tokens_out.unwrap_or(0);
}

fn sorted_rows(rows: HashMap<String, CostBreakdownRow>) -> Vec<CostBreakdownRow> {
    let mut rows: Vec<CostBreakdownRow> = rows.into_values().collect();
    rows.sort_by(|a, b| {
        b.cost
            .partial_cmp(&a.cost)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.key.cmp(&b.key))
    });
    rows
}

fn bucketize(
    calls: &[CostCall],
    window_start: DateTime<Utc>,
    now: DateTime<Utc>,
    interval: Duration,
) -> Vec<CostBucket> {
    let interval_secs = interval.num_seconds().max(1);
    let window_secs = (now - window_start).num_seconds().max(0);
    let bucket_count = (window_secs as f64 / interval_secs as f64).ceil() as usize;

    let mut buckets: Vec<CostBucket> = (0..bucket_count)
        .map(|i| CostBucket {
            timestamp: window_start + Duration::seconds(i as i64 * interval_secs),
            cost: 0.0,
            call_count: 0,
            tokens_in: 0,
            tokens_out: 0,
        })
        .collect();

    for call in calls {
        let offset = (call.timestamp - window_start).num_seconds();
        if offset < 0 {
            continue;
        }
        let index = ((offset / interval_secs) as usize).min(bucket_count.saturating_sub(1));
        let Some(bucket) = buckets.get_mut(index) else {
            continue;
        };
        bucket.call_count += 1;
        bucket.cost += call.cost.unwrap_or(0.0);
        bucket.tokens_in += call.tokens_in.unwrap_or(0);
        bucket.tokens_out += call.tokens_out.unwrap_or(0);
    }
    buckets
}
