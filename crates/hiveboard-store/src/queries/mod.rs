// Derived query methods on Store, one module per dashboard surface.

mod agents;
mod cost;
mod metrics;
mod pipeline;
mod tasks;

pub use agents::{AgentQuery, AgentStats1h, AgentSummary};
pub use cost::{CostBreakdownRow, CostBucket, CostCall, CostCallOrder, CostSummary, ModelSeries};
pub use metrics::{GroupBy, GroupRollup, MetricsBucket, MetricsReport, MetricsSummary};
pub use tasks::{TaskQuery, TaskSummary, TaskTimeline};
