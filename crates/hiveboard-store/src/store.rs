use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use hiveboard_engine::derive_status;
use hiveboard_types::{
    AgentRecord, AgentStatus, AlertHistoryEntry, AlertRule, ApiKey, Event, EventType, Project,
    ProjectAgent, ProjectStatus, Tenant, DEFAULT_PROJECT_SLUG,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::persist;

// NOTE: Storage Design Rationale
//
// Every table is an in-memory Vec behind its own async mutex, written
// through to one JSON file per table (temp file + atomic rename). That is
// deliberate: the event stream is the source of truth and all reads are
// in-memory scans, so the "database" only has to survive process restarts,
// not coordinate replicas. The obvious next step under load is a WAL plus
// an index; the query surface is already column-shaped for that.
//
// Lock order, for writers that need more than one table:
//   events -> agents -> project_agents
// The agent cache read-modify-write happens under the events lock so the
// pre-batch derived status (previous_status) is captured atomically with
// the insert; two concurrent batches serialize there.

pub(crate) struct EventsTable {
    pub rows: Vec<Event>,
    ids: HashSet<(String, Uuid)>,
}

impl EventsTable {
    fn new(rows: Vec<Event>) -> Self {
        let ids = rows
            .iter()
            .map(|e| (e.tenant_id.clone(), e.event_id))
            .collect();
        Self { rows, ids }
    }

    fn contains(&self, tenant_id: &str, event_id: Uuid) -> bool {
        self.ids.contains(&(tenant_id.to_string(), event_id))
    }

    fn push(&mut self, event: Event) {
        self.ids.insert((event.tenant_id.clone(), event.event_id));
        self.rows.push(event);
    }

    /// Rebuild the dedup index after a bulk retain.
    pub(crate) fn reindex(&mut self) {
        self.ids = self
            .rows
            .iter()
            .map(|e| (e.tenant_id.clone(), e.event_id))
            .collect();
    }
}

/// Multi-tenant in-memory storage with JSON write-through.
pub struct Store {
    data_dir: PathBuf,
    pub(crate) events: Mutex<EventsTable>,
    pub(crate) tenants: Mutex<Vec<Tenant>>,
    pub(crate) api_keys: Mutex<Vec<ApiKey>>,
    pub(crate) projects: Mutex<Vec<Project>>,
    pub(crate) agents: Mutex<Vec<AgentRecord>>,
    pub(crate) project_agents: Mutex<Vec<ProjectAgent>>,
    pub(crate) alert_rules: Mutex<Vec<AlertRule>>,
    pub(crate) alert_history: Mutex<Vec<AlertHistoryEntry>>,
}

/// What happened to one accepted batch.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Events actually written (duplicates silently dropped)
    pub inserted: Vec<Event>,
    /// Derived status immediately before this batch's side-effects
    pub previous_status: AgentStatus,
    /// Derived status after the insert
    pub new_status: AgentStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub current_task_id: Option<String>,
    pub current_project_id: Option<String>,
}

impl Store {
    /// Load all tables from `data_dir`, creating the directory if needed.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;

        let events: Vec<Event> = persist::load_table(data_dir, "events")?;
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            events: Mutex::new(EventsTable::new(events)),
            tenants: Mutex::new(persist::load_table(data_dir, "tenants")?),
            api_keys: Mutex::new(persist::load_table(data_dir, "api_keys")?),
            projects: Mutex::new(persist::load_table(data_dir, "projects")?),
            agents: Mutex::new(persist::load_table(data_dir, "agents")?),
            project_agents: Mutex::new(persist::load_table(data_dir, "project_agents")?),
            alert_rules: Mutex::new(persist::load_table(data_dir, "alert_rules")?),
            alert_history: Mutex::new(persist::load_table(data_dir, "alert_history")?),
        })
    }

    pub(crate) fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Insert one agent's validated batch. `events` must already be
    /// envelope-enriched and sorted ascending by timestamp.
    ///
    /// Captures the pre-insert derived status, dedups by
    /// (tenant_id, event_id), upserts the agent cache and the
    /// project-agent junction, and reports the post-insert status.
    pub async fn insert_batch(
        &self,
        tenant_id: &str,
        agent_id: &str,
        events: Vec<Event>,
        now: DateTime<Utc>,
        stuck_threshold: Duration,
    ) -> Result<BatchOutcome> {
        let mut table = self.events.lock().await;
        let mut agents = self.agents.lock().await;

        let record_before = agents
            .iter()
            .find(|r| r.tenant_id == tenant_id && r.agent_id == agent_id)
            .cloned();

        let stream_before = agent_stream(&table.rows, tenant_id, agent_id);
        let previous_status = derive_status(
            &stream_before,
            record_before.as_ref().and_then(|r| r.last_heartbeat),
            now,
            stuck_threshold,
        );

        let mut inserted = Vec::with_capacity(events.len());
        for event in events {
            if table.contains(tenant_id, event.event_id) {
                continue;
            }
            table.push(event.clone());
            inserted.push(event);
        }

        if !inserted.is_empty() {
            upsert_agent_record(&mut agents, tenant_id, agent_id, &inserted, previous_status);
        }

        let record_after = agents
            .iter()
            .find(|r| r.tenant_id == tenant_id && r.agent_id == agent_id)
            .cloned();
        let last_heartbeat = record_after.as_ref().and_then(|r| r.last_heartbeat);

        let stream_after = agent_stream(&table.rows, tenant_id, agent_id);
        let new_status = derive_status(&stream_after, last_heartbeat, now, stuck_threshold);

        if !inserted.is_empty() {
            persist::save_table(&self.data_dir, "events", &table.rows)?;
            persist::save_table(&self.data_dir, "agents", &agents)?;
        }

        let outcome = BatchOutcome {
            current_task_id: record_after.as_ref().and_then(|r| r.last_task_id.clone()),
            current_project_id: record_after
                .as_ref()
                .and_then(|r| r.last_project_id.clone()),
            inserted,
            previous_status,
            new_status,
            last_heartbeat,
        };

        drop(agents);
        drop(table);

        self.link_project_agents(tenant_id, &outcome.inserted)
            .await?;

        Ok(outcome)
    }

    /// Auto-populate the (tenant, project, agent) junction for new triples.
    async fn link_project_agents(&self, tenant_id: &str, inserted: &[Event]) -> Result<()> {
        let mut fresh: Vec<ProjectAgent> = Vec::new();
        for event in inserted {
            if let Some(project_id) = &event.project_id {
                let link = ProjectAgent {
                    tenant_id: tenant_id.to_string(),
                    project_id: project_id.clone(),
                    agent_id: event.agent_id.clone(),
                };
                if !fresh.contains(&link) {
                    fresh.push(link);
                }
            }
        }
        if fresh.is_empty() {
            return Ok(());
        }

        let mut junction = self.project_agents.lock().await;
        let mut changed = false;
        for link in fresh {
            if !junction.contains(&link) {
                junction.push(link);
                changed = true;
            }
        }
        if changed {
            persist::save_table(&self.data_dir, "project_agents", &junction)?;
        }
        Ok(())
    }

    /// Snapshot of one tenant's events; readers work on the copy so query
    /// scans never hold the write lock.
    pub async fn tenant_events(&self, tenant_id: &str) -> Vec<Event> {
        let table = self.events.lock().await;
        table
            .rows
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .cloned()
            .collect()
    }

    pub async fn event_count(&self) -> usize {
        self.events.lock().await.rows.len()
    }

    // ---- tenants & keys ----------------------------------------------------

    /// Insert the tenant if unknown and make sure its implicit default
    /// project exists.
    pub async fn ensure_tenant(&self, tenant: Tenant) -> Result<()> {
        let tenant_id = tenant.tenant_id.clone();
        {
            let mut tenants = self.tenants.lock().await;
            if !tenants.iter().any(|t| t.tenant_id == tenant.tenant_id) {
                tenants.push(tenant);
                persist::save_table(&self.data_dir, "tenants", &tenants)?;
            }
        }

        let mut projects = self.projects.lock().await;
        let has_default = projects
            .iter()
            .any(|p| p.tenant_id == tenant_id && p.slug == DEFAULT_PROJECT_SLUG);
        if !has_default {
            projects.push(Project {
                project_id: Uuid::new_v4().to_string(),
                tenant_id,
                slug: DEFAULT_PROJECT_SLUG.to_string(),
                name: "Default".to_string(),
                status: ProjectStatus::Open,
                created_at: Utc::now(),
            });
            persist::save_table(&self.data_dir, "projects", &projects)?;
        }
        Ok(())
    }

    pub async fn get_tenant(&self, tenant_id: &str) -> Option<Tenant> {
        self.tenants
            .lock()
            .await
            .iter()
            .find(|t| t.tenant_id == tenant_id)
            .cloned()
    }

    pub async fn insert_api_key(&self, key: ApiKey) -> Result<()> {
        let mut keys = self.api_keys.lock().await;
        if keys.iter().any(|k| k.key_hash == key.key_hash) {
            return Ok(());
        }
        keys.push(key);
        persist::save_table(&self.data_dir, "api_keys", &keys)?;
        Ok(())
    }

    pub async fn find_key_by_hash(&self, key_hash: &str) -> Option<ApiKey> {
        self.api_keys
            .lock()
            .await
            .iter()
            .find(|k| k.key_hash == key_hash)
            .cloned()
    }

    // ---- projects ----------------------------------------------------------

    pub async fn list_projects(&self, tenant_id: &str) -> Vec<Project> {
        self.projects
            .lock()
            .await
            .iter()
            .filter(|p| p.tenant_id == tenant_id)
            .cloned()
            .collect()
    }

    pub async fn get_project(&self, tenant_id: &str, id_or_slug: &str) -> Option<Project> {
        self.projects
            .lock()
            .await
            .iter()
            .find(|p| {
                p.tenant_id == tenant_id && (p.project_id == id_or_slug || p.slug == id_or_slug)
            })
            .cloned()
    }

    /// Whether events may reference this project. Used by ingestion to
    /// reject events naming a project the tenant does not have.
    pub async fn project_known(&self, tenant_id: &str, id_or_slug: &str) -> bool {
        self.get_project(tenant_id, id_or_slug).await.is_some()
    }

    pub async fn create_project(
        &self,
        tenant_id: &str,
        slug: &str,
        name: &str,
    ) -> Result<Project> {
        let mut projects = self.projects.lock().await;
        if projects
            .iter()
            .any(|p| p.tenant_id == tenant_id && p.slug == slug)
        {
            return Err(Error::Conflict(format!(
                "project slug '{}' already exists",
                slug
            )));
        }

        let project = Project {
            project_id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            slug: slug.to_string(),
            name: name.to_string(),
            status: ProjectStatus::Open,
            created_at: Utc::now(),
        };
        projects.push(project.clone());
        persist::save_table(&self.data_dir, "projects", &projects)?;
        Ok(project)
    }

    /// Rename and/or archive. Archived is reversible.
    pub async fn update_project(
        &self,
        tenant_id: &str,
        project_id: &str,
        name: Option<String>,
        status: Option<ProjectStatus>,
    ) -> Result<Project> {
        let mut projects = self.projects.lock().await;
        let project = projects
            .iter_mut()
            .find(|p| p.tenant_id == tenant_id && p.project_id == project_id)
            .ok_or_else(|| Error::NotFound(format!("project {}", project_id)))?;

        if let Some(name) = name {
            project.name = name;
        }
        if let Some(status) = status {
            project.status = status;
        }
        let updated = project.clone();
        persist::save_table(&self.data_dir, "projects", &projects)?;
        Ok(updated)
    }

    pub async fn delete_project(&self, tenant_id: &str, project_id: &str) -> Result<()> {
        let mut projects = self.projects.lock().await;
        let index = projects
            .iter()
            .position(|p| p.tenant_id == tenant_id && p.project_id == project_id)
            .ok_or_else(|| Error::NotFound(format!("project {}", project_id)))?;

        if projects[index].slug == DEFAULT_PROJECT_SLUG {
            return Err(Error::CannotDeleteDefault);
        }
        projects.remove(index);
        persist::save_table(&self.data_dir, "projects", &projects)?;
        Ok(())
    }

    pub async fn agents_in_project(&self, tenant_id: &str, project_id: &str) -> Vec<String> {
        self.project_agents
            .lock()
            .await
            .iter()
            .filter(|l| l.tenant_id == tenant_id && l.project_id == project_id)
            .map(|l| l.agent_id.clone())
            .collect()
    }

    // ---- agent cache -------------------------------------------------------

    pub async fn list_agent_records(&self, tenant_id: &str) -> Vec<AgentRecord> {
        self.agents
            .lock()
            .await
            .iter()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect()
    }

    pub async fn get_agent_record(&self, tenant_id: &str, agent_id: &str) -> Option<AgentRecord> {
        self.agents
            .lock()
            .await
            .iter()
            .find(|r| r.tenant_id == tenant_id && r.agent_id == agent_id)
            .cloned()
    }

    // ---- alert rules & history --------------------------------------------

    pub async fn list_alert_rules(&self, tenant_id: &str) -> Vec<AlertRule> {
        self.alert_rules
            .lock()
            .await
            .iter()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect()
    }

    pub async fn create_alert_rule(&self, rule: AlertRule) -> Result<AlertRule> {
        let mut rules = self.alert_rules.lock().await;
        if rules
            .iter()
            .any(|r| r.tenant_id == rule.tenant_id && r.rule_id == rule.rule_id)
        {
            return Err(Error::Conflict(format!(
                "alert rule {} already exists",
                rule.rule_id
            )));
        }
        rules.push(rule.clone());
        persist::save_table(&self.data_dir, "alert_rules", &rules)?;
        Ok(rule)
    }

    pub async fn update_alert_rule(&self, rule: AlertRule) -> Result<AlertRule> {
        let mut rules = self.alert_rules.lock().await;
        let slot = rules
            .iter_mut()
            .find(|r| r.tenant_id == rule.tenant_id && r.rule_id == rule.rule_id)
            .ok_or_else(|| Error::NotFound(format!("alert rule {}", rule.rule_id)))?;
        *slot = rule.clone();
        persist::save_table(&self.data_dir, "alert_rules", &rules)?;
        Ok(rule)
    }

    pub async fn delete_alert_rule(&self, tenant_id: &str, rule_id: &str) -> Result<()> {
        let mut rules = self.alert_rules.lock().await;
        let index = rules
            .iter()
            .position(|r| r.tenant_id == tenant_id && r.rule_id == rule_id)
            .ok_or_else(|| Error::NotFound(format!("alert rule {}", rule_id)))?;
        rules.remove(index);
        persist::save_table(&self.data_dir, "alert_rules", &rules)?;
        Ok(())
    }

    pub async fn append_alert_history(&self, entry: AlertHistoryEntry) -> Result<()> {
        let mut history = self.alert_history.lock().await;
        history.push(entry);
        persist::save_table(&self.data_dir, "alert_history", &history)?;
        Ok(())
    }

    pub async fn list_alert_history(&self, tenant_id: &str, limit: usize) -> Vec<AlertHistoryEntry> {
        let history = self.alert_history.lock().await;
        let mut rows: Vec<AlertHistoryEntry> = history
            .iter()
            .filter(|h| h.tenant_id == tenant_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.fired_at.cmp(&a.fired_at));
        rows.truncate(limit);
        rows
    }
}

/// One agent's events sorted ascending; the input the derivation layer wants.
pub(crate) fn agent_stream(rows: &[Event], tenant_id: &str, agent_id: &str) -> Vec<Event> {
    let mut stream: Vec<Event> = rows
        .iter()
        .filter(|e| e.tenant_id == tenant_id && e.agent_id == agent_id)
        .cloned()
        .collect();
    stream.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    stream
}

/// Upsert the cache row from a batch's accepted events. `inserted` is
/// sorted ascending, so the chronologically-latest event drives the
/// last_* fields regardless of submission order.
fn upsert_agent_record(
    agents: &mut Vec<AgentRecord>,
    tenant_id: &str,
    agent_id: &str,
    inserted: &[Event],
    previous_status: AgentStatus,
) {
    let latest = match inserted.last() {
        Some(event) => event,
        None => return,
    };
    let earliest_ts = inserted.first().map(|e| e.timestamp).unwrap_or(latest.timestamp);

    let batch_heartbeat = inserted
        .iter()
        .filter(|e| e.event_type == EventType::Heartbeat)
        .map(|e| e.timestamp)
        .max();
    let latest_task_id = inserted
        .iter()
        .rev()
        .find_map(|e| e.task_id.clone());
    let latest_project_id = inserted
        .iter()
        .rev()
        .find_map(|e| e.project_id.clone());

    let record = match agents
        .iter_mut()
        .find(|r| r.tenant_id == tenant_id && r.agent_id == agent_id)
    {
        Some(record) => record,
        None => {
            agents.push(AgentRecord {
                tenant_id: tenant_id.to_string(),
                agent_id: agent_id.to_string(),
                agent_type: None,
                agent_version: None,
                framework: None,
                environment: None,
                group: None,
                first_seen: earliest_ts,
                last_seen: earliest_ts,
                last_heartbeat: None,
                last_event_type: None,
                last_task_id: None,
                last_project_id: None,
                previous_status: None,
            });
            agents.last_mut().unwrap()
        }
    };

    record.previous_status = Some(previous_status);
    record.last_seen = record.last_seen.max(latest.timestamp);
    record.last_event_type = Some(latest.event_type);
    if let Some(hb) = batch_heartbeat {
        record.last_heartbeat = Some(record.last_heartbeat.map_or(hb, |old| old.max(hb)));
    }
    if latest_task_id.is_some() {
        record.last_task_id = latest_task_id;
    }
    if latest_project_id.is_some() {
        record.last_project_id = latest_project_id;
    }

    // Identity fields inherit from whatever the envelope stamped last
    if latest.agent_type.is_some() {
        record.agent_type = latest.agent_type.clone();
    }
    if latest.agent_version.is_some() {
        record.agent_version = latest.agent_version.clone();
    }
    if latest.framework.is_some() {
        record.framework = latest.framework.clone();
    }
    if latest.environment.is_some() {
        record.environment = latest.environment.clone();
    }
    if latest.group.is_some() {
        record.group = latest.group.clone();
    }
}
