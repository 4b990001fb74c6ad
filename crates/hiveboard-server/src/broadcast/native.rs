use std::collections::HashMap;

use async_trait::async_trait;
use hiveboard_types::Event;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    Broadcaster, ClientAction, ClientMessage, ServerMessage, StatusChange, StuckNotice,
    Subscription,
};

struct Connection {
    tenant_id: String,
    subscription: Subscription,
    tx: UnboundedSender<ServerMessage>,
    awaiting_pong: bool,
}

/// In-process WebSocket subscription manager.
///
/// Socket tasks register an outbound channel here; fan-out snapshots the
/// matching senders under the lock and sends after releasing it, so a slow
/// consumer never blocks the map.
pub struct NativeBus {
    connections: Mutex<HashMap<Uuid, Connection>>,
}

impl NativeBus {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Attach a socket; the returned id keys every later call.
    pub async fn register(&self, tenant_id: &str, tx: UnboundedSender<ServerMessage>) -> Uuid {
        let id = Uuid::new_v4();
        self.connections.lock().await.insert(
            id,
            Connection {
                tenant_id: tenant_id.to_string(),
                subscription: Subscription::default(),
                tx,
                awaiting_pong: false,
            },
        );
        tracing::debug!(connection = %id, tenant = tenant_id, "stream connected");
        id
    }

    pub async fn unregister(&self, id: Uuid) {
        if self.connections.lock().await.remove(&id).is_some() {
            tracing::debug!(connection = %id, "stream disconnected");
        }
    }

    /// Apply a client message; returns the direct reply, if any.
    pub async fn handle_client_message(
        &self,
        id: Uuid,
        message: &ClientMessage,
    ) -> Option<ServerMessage> {
        let mut connections = self.connections.lock().await;
        let connection = connections.get_mut(&id)?;
        match message.action {
            ClientAction::Subscribe => {
                connection
                    .subscription
                    .subscribe(&message.channels, message.filters.clone());
                None
            }
            ClientAction::Unsubscribe => {
                connection.subscription.unsubscribe(&message.channels);
                None
            }
            ClientAction::Ping => Some(ServerMessage::Pong),
        }
    }

    /// A pong (either a WS pong frame or a `{action: "ping"}` round-trip)
    /// proves liveness for the current interval.
    pub async fn note_pong(&self, id: Uuid) {
        if let Some(connection) = self.connections.lock().await.get_mut(&id) {
            connection.awaiting_pong = false;
        }
    }

    /// One pass of the 30 s ping loop: connections that never answered the
    /// previous ping are dropped, everyone else gets a fresh ping.
    pub async fn ping_pass(&self) -> Vec<Uuid> {
        let mut stale = Vec::new();
        let mut connections = self.connections.lock().await;
        connections.retain(|id, connection| {
            if connection.awaiting_pong {
                stale.push(*id);
                return false;
            }
            connection.awaiting_pong = true;
            // A closed channel means the socket task is gone
            connection.tx.send(ServerMessage::Ping).is_ok()
        });
        drop(connections);

        for id in &stale {
            tracing::debug!(connection = %id, "dropping unresponsive stream");
        }
        stale
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.lock().await.len()
    }

    async fn send_matching<F>(&self, tenant_id: &str, select: F, message: &ServerMessage)
    where
        F: Fn(&Subscription) -> bool,
    {
        let targets: Vec<UnboundedSender<ServerMessage>> = {
            let connections = self.connections.lock().await;
            connections
                .values()
                .filter(|c| c.tenant_id == tenant_id && select(&c.subscription))
                .map(|c| c.tx.clone())
                .collect()
        };
        for tx in targets {
            let _ = tx.send(message.clone());
        }
    }
}

impl Default for NativeBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broadcaster for NativeBus {
    async fn broadcast_events(&self, tenant_id: &str, events: &[Event]) {
        for event in events {
            self.send_matching(
                tenant_id,
                |sub| sub.matches_event(event),
                &ServerMessage::EventNew(event.clone()),
            )
            .await;
        }
    }

    async fn broadcast_agent_status_change(&self, tenant_id: &str, change: &StatusChange) {
        self.send_matching(
            tenant_id,
            Subscription::wants_agent_messages,
            &ServerMessage::AgentStatusChanged(change.clone()),
        )
        .await;
    }

    async fn broadcast_agent_stuck(&self, tenant_id: &str, notice: &StuckNotice) {
        self.send_matching(
            tenant_id,
            Subscription::wants_agent_messages,
            &ServerMessage::AgentStuck(notice.clone()),
        )
        .await;
    }

    async fn clear_stuck(&self, tenant_id: &str, agent_id: &str) {
        self.send_matching(
            tenant_id,
            Subscription::wants_agent_messages,
            &ServerMessage::AgentStuckCleared {
                agent_id: agent_id.to_string(),
            },
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hiveboard_types::{EventType, KeyType, Severity};
    use tokio::sync::mpsc::unbounded_channel;

    fn event(tenant: &str, severity: Severity) -> Event {
        Event {
            event_id: Uuid::new_v4(),
            tenant_id: tenant.to_string(),
            key_type: KeyType::Live,
            timestamp: "2026-03-01T12:00:00Z".parse().unwrap(),
            event_type: EventType::Custom,
            severity,
            status: None,
            agent_id: "agent-1".to_string(),
            project_id: None,
            task_id: None,
            action_id: None,
            parent_action_id: None,
            environment: None,
            group: None,
            agent_type: None,
            agent_version: None,
            framework: None,
            sdk_version: None,
            duration_ms: None,
            payload: None,
        }
    }

    fn subscribe_all() -> ClientMessage {
        ClientMessage {
            action: ClientAction::Subscribe,
            channels: vec!["events".to_string(), "agents".to_string()],
            filters: None,
            token: None,
        }
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let bus = NativeBus::new();

        let (tx_a, mut rx_a) = unbounded_channel();
        let id_a = bus.register("tenant-a", tx_a).await;
        bus.handle_client_message(id_a, &subscribe_all()).await;

        let (tx_b, mut rx_b) = unbounded_channel();
        let id_b = bus.register("tenant-b", tx_b).await;
        bus.handle_client_message(id_b, &subscribe_all()).await;

        bus.broadcast_events("tenant-a", &[event("tenant-a", Severity::Info)])
            .await;

        assert!(matches!(rx_a.try_recv(), Ok(ServerMessage::EventNew(_))));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribed_connection_gets_nothing() {
        let bus = NativeBus::new();
        let (tx, mut rx) = unbounded_channel();
        bus.register("tenant-a", tx).await;

        bus.broadcast_events("tenant-a", &[event("tenant-a", Severity::Info)])
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ping_pass_drops_silent_connections() {
        let bus = NativeBus::new();
        let (tx, mut rx) = unbounded_channel();
        let id = bus.register("tenant-a", tx).await;

        // First pass sends a ping
        assert!(bus.ping_pass().await.is_empty());
        assert!(matches!(rx.try_recv(), Ok(ServerMessage::Ping)));

        // No pong: the next pass drops the connection
        let dropped = bus.ping_pass().await;
        assert_eq!(dropped, vec![id]);
        assert_eq!(bus.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_pong_keeps_connection_alive() {
        let bus = NativeBus::new();
        let (tx, _rx) = unbounded_channel();
        let id = bus.register("tenant-a", tx).await;

        bus.ping_pass().await;
        bus.note_pong(id).await;
        assert!(bus.ping_pass().await.is_empty());
        assert_eq!(bus.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_ping_action_gets_pong() {
        let bus = NativeBus::new();
        let (tx, _rx) = unbounded_channel();
        let id = bus.register("tenant-a", tx).await;

        let reply = bus
            .handle_client_message(
                id,
                &ClientMessage {
                    action: ClientAction::Ping,
                    channels: Vec::new(),
                    filters: None,
                    token: None,
                },
            )
            .await;
        assert!(matches!(reply, Some(ServerMessage::Pong)));
    }
}
