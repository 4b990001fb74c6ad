use chrono::{DateTime, Utc};
use hiveboard_types::{Event, PayloadData, PlanCreatedData, PlanStepAction};
use serde::Serialize;

/// One step of the plan overlay.
#[derive(Debug, Clone, Serialize)]
pub struct PlanStepView {
    pub description: String,
    pub action: Option<PlanStepAction>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PlanProgress {
    pub completed: usize,
    pub total: usize,
}

/// Plan overlay for a task timeline: the latest plan snapshot with per-step
/// transitions folded in.
#[derive(Debug, Clone, Serialize)]
pub struct PlanOverlay {
    pub goal: Option<String>,
    pub revision: u32,
    pub steps: Vec<PlanStepView>,
    pub progress: PlanProgress,
}

/// Build the plan overlay from a task's events (ascending). The
/// `plan_created` snapshot with the highest revision wins; `plan_step`
/// events then mark step transitions. Returns None when the task carries no
/// plan events at all.
pub fn build_plan_overlay(events: &[Event]) -> Option<PlanOverlay> {
    let mut best: Option<(u32, &PlanCreatedData)> = None;

    for event in events {
        if let Some(PayloadData::PlanCreated(plan)) = event.payload_data() {
            let revision = plan.revision.unwrap_or(0);
            let replace = match &best {
                Some((current, _)) => revision >= *current,
                None => true,
            };
            if replace {
                best = Some((revision, plan));
            }
        }
    }

    let (revision, plan) = best?;

    let mut steps: Vec<PlanStepView> = plan
        .steps
        .iter()
        .map(|description| PlanStepView {
            description: description.clone(),
            action: None,
            started_at: None,
            completed_at: None,
        })
        .collect();

    for event in events {
        let Some(PayloadData::PlanStep(step)) = event.payload_data() else {
            continue;
        };
        let Some(index) = step.step_index else {
            continue;
        };
        let Some(view) = steps.get_mut(index) else {
            continue;
        };
        match step.action {
            Some(PlanStepAction::Started) => {
                if view.started_at.is_none() {
                    view.started_at = Some(event.timestamp);
                }
                view.action = Some(PlanStepAction::Started);
            }
            Some(action) => {
                view.completed_at = Some(event.timestamp);
                view.action = Some(action);
            }
            None => {}
        }
    }

    let completed = steps
        .iter()
        .filter(|s| matches!(s.action, Some(PlanStepAction::Completed)))
        .count();
    let total = steps.len();

    Some(PlanOverlay {
        goal: plan.goal.clone(),
        revision,
        steps,
        progress: PlanProgress { completed, total },
    })
}
