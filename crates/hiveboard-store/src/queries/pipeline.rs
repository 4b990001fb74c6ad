use hiveboard_engine::{build_pipeline, PipelineView};
use hiveboard_types::KeyType;

use crate::filter::{filter_events, EventFilter};
use crate::store::Store;

impl Store {
    /// Reconstruct an agent's pipeline (queue, todos, scheduled, issues)
    /// from its newest payload-kind events.
    pub async fn get_pipeline(
        &self,
        tenant_id: &str,
        viewer: KeyType,
        agent_id: &str,
    ) -> PipelineView {
        let rows = self.tenant_events(tenant_id).await;
        let events = filter_events(
            &rows,
            tenant_id,
            viewer,
            &EventFilter::for_agent(agent_id),
            true,
        );
        build_pipeline(&events)
    }
}
