// Derivation layer: everything here is a pure function over slices of events.
// No table is a source of truth; the stream is.

mod pipeline;
mod plan;
mod status;
mod task;
mod timeline;

pub use pipeline::{build_pipeline, IssueView, PipelineView, QueueSection, ScheduledSection, TodoItemView};
pub use plan::{build_plan_overlay, PlanOverlay, PlanProgress, PlanStepView};
pub use status::{derive_status, heartbeat_age_seconds, StuckTracker};
pub use task::{derive_task_state, TaskState};
pub use timeline::{build_action_tree, build_error_chains, ActionNode, ActionState, ErrorChain};
