use std::collections::HashMap;

use chrono::{DateTime, Utc};
use hiveboard_types::{Event, EventType, PayloadData};
use serde::Serialize;
use uuid::Uuid;

/// Execution state of one action in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    Running,
    Completed,
    Failed,
}

/// One node of a task's action tree. `events` and `children` are always
/// present (possibly empty) for consumer compatibility.
#[derive(Debug, Clone, Serialize)]
pub struct ActionNode {
    pub action_id: String,
    pub name: Option<String>,
    pub status: ActionState,
    pub duration_ms: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub events: Vec<Uuid>,
    pub children: Vec<ActionNode>,
}

/// Build the action tree for a task from its events sorted ascending.
///
/// Every action_* event contributes to the node keyed by its action_id; the
/// completion event supplies status and duration, a missing completion
/// leaves the node running. Nodes with a parent_action_id attach under their
/// parent; only roots are returned, in first-seen order.
pub fn build_action_tree(events: &[Event]) -> Vec<ActionNode> {
    struct Pending {
        node: ActionNode,
        parent: Option<String>,
        order: usize,
    }

    let mut by_id: HashMap<String, Pending> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for event in events {
        let Some(action_id) = event.action_id.as_deref() else {
            continue;
        };
        if !matches!(
            event.event_type,
            EventType::ActionStarted | EventType::ActionCompleted | EventType::ActionFailed
        ) {
            continue;
        }

        let pending = by_id.entry(action_id.to_string()).or_insert_with(|| {
            order.push(action_id.to_string());
            Pending {
                node: ActionNode {
                    action_id: action_id.to_string(),
                    name: None,
                    status: ActionState::Running,
                    duration_ms: None,
                    started_at: None,
                    events: Vec::new(),
                    children: Vec::new(),
                },
                parent: None,
                order: order.len() - 1,
            }
        });

        pending.node.events.push(event.event_id);
        if pending.parent.is_none() {
            pending.parent = event.parent_action_id.clone();
        }
        if pending.node.name.is_none() {
            pending.node.name = action_name(event);
        }

        match event.event_type {
            EventType::ActionStarted => {
                if pending.node.started_at.is_none() {
                    pending.node.started_at = Some(event.timestamp);
                }
            }
            EventType::ActionCompleted => {
                pending.node.status = ActionState::Completed;
                pending.node.duration_ms = event.duration_ms.or(pending.node.duration_ms);
            }
            EventType::ActionFailed => {
                pending.node.status = ActionState::Failed;
                pending.node.duration_ms = event.duration_ms.or(pending.node.duration_ms);
            }
            _ => {}
        }
    }

    // Attach children to parents, deepest-declared last so sibling order
    // follows first appearance in the stream.
    let mut parents: HashMap<String, Vec<String>> = HashMap::new();
    let mut roots: Vec<(usize, String)> = Vec::new();
    for id in &order {
        let pending = &by_id[id];
        // A parent reference that is missing (pruned) or self-referential
        // degrades the node to a root rather than losing it
        match pending
            .parent
            .as_ref()
            .filter(|p| *p != id && by_id.contains_key(*p))
        {
            Some(parent) => parents.entry(parent.clone()).or_default().push(id.clone()),
            None => roots.push((pending.order, id.clone())),
        }
    }
    roots.sort_by_key(|(ord, _)| *ord);

    fn detach(
        id: &str,
        by_id: &mut HashMap<String, ActionNode>,
        parents: &HashMap<String, Vec<String>>,
    ) -> Option<ActionNode> {
        let mut node = by_id.remove(id)?;
        if let Some(child_ids) = parents.get(id) {
            for child_id in child_ids {
                if let Some(child) = detach(child_id, by_id, parents) {
                    node.children.push(child);
                }
            }
        }
        Some(node)
    }

    let mut nodes: HashMap<String, ActionNode> =
        by_id.into_iter().map(|(id, p)| (id, p.node)).collect();

    roots
        .into_iter()
        .filter_map(|(_, id)| detach(&id, &mut nodes, &parents))
        .collect()
}

/// Display name for an action: `action_name` from the payload data when
/// present, otherwise the payload summary.
fn action_name(event: &Event) -> Option<String> {
    let payload = event.payload.as_ref()?;
    if let PayloadData::Unknown {
        data: Some(data), ..
    } = &payload.data
    {
        if let Some(name) = data.get("action_name").and_then(|v| v.as_str()) {
            return Some(name.to_string());
        }
    }
    payload.summary.clone()
}

/// A run of related failures within one task.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorChain {
    pub task_id: Option<String>,
    pub event_ids: Vec<Uuid>,
    pub first_at: DateTime<Utc>,
    pub last_at: DateTime<Utc>,
}

/// Group failures into chains. Failures accumulate into the current chain
/// while they share the task_id or carry an explicit `caused_by` link; any
/// successful completion in between closes the chain.
pub fn build_error_chains(events: &[Event]) -> Vec<ErrorChain> {
    let mut chains: Vec<ErrorChain> = Vec::new();
    let mut current: Option<ErrorChain> = None;
    let mut last_failure_marker: Option<String> = None;

    for event in events {
        match event.event_type {
            EventType::TaskFailed | EventType::ActionFailed => {
                let linked = match &current {
                    Some(chain) => {
                        chain.task_id == event.task_id || caused_by(event) == last_failure_marker
                    }
                    None => false,
                };

                if linked {
                    let chain = current.as_mut().unwrap();
                    chain.event_ids.push(event.event_id);
                    chain.last_at = event.timestamp;
                } else {
                    if let Some(done) = current.take() {
                        chains.push(done);
                    }
                    current = Some(ErrorChain {
                        task_id: event.task_id.clone(),
                        event_ids: vec![event.event_id],
                        first_at: event.timestamp,
                        last_at: event.timestamp,
                    });
                }
                last_failure_marker = event
                    .action_id
                    .clone()
                    .or_else(|| Some(event.event_id.to_string()));
            }
            EventType::TaskCompleted | EventType::ActionCompleted => {
                if let Some(done) = current.take() {
                    chains.push(done);
                }
                last_failure_marker = None;
            }
            _ => {}
        }
    }

    if let Some(done) = current.take() {
        chains.push(done);
    }
    chains
}

fn caused_by(event: &Event) -> Option<String> {
    let payload = event.payload.as_ref()?;
    if let PayloadData::Unknown {
        data: Some(data), ..
    } = &payload.data
    {
        return data
            .get("caused_by")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
    }
    None
}
