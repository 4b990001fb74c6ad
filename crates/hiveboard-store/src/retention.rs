use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use hiveboard_types::{
    EventType, ACTION_STARTED_RETENTION_SECONDS, HEARTBEAT_RETENTION_SECONDS,
};
use serde::Serialize;

use crate::error::Result;
use crate::persist;
use crate::store::Store;

/// What one prune pass removed.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PruneReport {
    pub ttl_pruned: usize,
    pub cold_pruned: usize,
    pub total_pruned: usize,
}

impl Store {
    /// Single-pass prune running both policies under the events lock.
    ///
    /// Phase 1 (plan TTL): an event older than its tenant's retention window
    /// is dropped. An unknown tenant or an unparseable window keeps the
    /// event; data is never silently discarded on doubt.
    ///
    /// Phase 2 (cold pruning): heartbeats beyond ten minutes and
    /// action_started beyond a day go regardless of plan, they carry no
    /// long-term value.
    ///
    /// Alert history gets the same plan TTL. Persists only when something
    /// was actually removed.
    pub async fn prune(&self, now: DateTime<Utc>) -> Result<PruneReport> {
        let retention: HashMap<String, Duration> = {
            let tenants = self.tenants.lock().await;
            tenants
                .iter()
                .map(|t| (t.tenant_id.clone(), Duration::days(t.plan.retention_days())))
                .collect()
        };

        let heartbeat_cutoff = now - Duration::seconds(HEARTBEAT_RETENTION_SECONDS);
        let action_started_cutoff = now - Duration::seconds(ACTION_STARTED_RETENTION_SECONDS);

        let mut report = PruneReport::default();

        {
            let mut table = self.events.lock().await;
            table.rows.retain(|event| {
                if let Some(window) = retention.get(&event.tenant_id) {
                    if event.timestamp < now - *window {
                        report.ttl_pruned += 1;
                        return false;
                    }
                }
                match event.event_type {
                    EventType::Heartbeat if event.timestamp < heartbeat_cutoff => {
                        report.cold_pruned += 1;
                        false
                    }
                    EventType::ActionStarted if event.timestamp < action_started_cutoff => {
                        report.cold_pruned += 1;
                        false
                    }
                    _ => true,
                }
            });

            if report.ttl_pruned + report.cold_pruned > 0 {
                table.reindex();
                persist::save_table(self.data_dir(), "events", &table.rows)?;
            }
        }

        {
            let mut history = self.alert_history.lock().await;
            let before = history.len();
            history.retain(|entry| match retention.get(&entry.tenant_id) {
                Some(window) => entry.fired_at >= now - *window,
                None => true,
            });
            let removed = before - history.len();
            if removed > 0 {
                report.ttl_pruned += removed;
                persist::save_table(self.data_dir(), "alert_history", &history)?;
            }
        }

        report.total_pruned = report.ttl_pruned + report.cold_pruned;
        Ok(report)
    }
}
