use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use hiveboard_store::Store;
use hiveboard_types::{ApiKey, Event};
use tokio::sync::Mutex;

use super::{
    Broadcaster, ClientAction, ClientMessage, ServerMessage, StatusChange, StuckNotice,
    Subscription,
};

// NOTE: Bridge Design Rationale
//
// In production a separate gateway terminates the WebSockets and calls back
// over HTTP (connect / disconnect / message); outbound frames go to the
// gateway's management API. The gateway may forward a message for a
// connection this process has never seen (it survived a server restart), so
// every message handler runs a defensive re-registration step first: if the
// body carries a token, authenticate and register before dispatching.

#[derive(Debug, Clone)]
struct BridgeConnection {
    tenant_id: String,
    #[allow(dead_code)]
    key_id: String,
    subscription: Subscription,
}

#[derive(Default)]
struct BridgeTable {
    connections: HashMap<String, BridgeConnection>,
    by_tenant: HashMap<String, Vec<String>>,
}

impl BridgeTable {
    fn insert(&mut self, connection_id: &str, connection: BridgeConnection) {
        let tenant = connection.tenant_id.clone();
        if self
            .connections
            .insert(connection_id.to_string(), connection)
            .is_none()
        {
            self.by_tenant
                .entry(tenant)
                .or_default()
                .push(connection_id.to_string());
        }
    }

    fn remove(&mut self, connection_id: &str) {
        if let Some(connection) = self.connections.remove(connection_id) {
            if let Some(ids) = self.by_tenant.get_mut(&connection.tenant_id) {
                ids.retain(|id| id != connection_id);
                if ids.is_empty() {
                    self.by_tenant.remove(&connection.tenant_id);
                }
            }
        }
    }
}

/// HTTP-bridge back-end for an external WebSocket gateway.
pub struct BridgeBus {
    endpoint: String,
    client: reqwest::Client,
    table: Mutex<BridgeTable>,
}

impl BridgeBus {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            // The gateway cuts management calls at 29 s
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(29))
                .build()
                .unwrap_or_default(),
            table: Mutex::new(BridgeTable::default()),
        }
    }

    /// `POST /ws/connect`: bind an authenticated connectionId.
    pub async fn register(&self, connection_id: &str, key: &ApiKey) {
        let mut table = self.table.lock().await;
        table.insert(
            connection_id,
            BridgeConnection {
                tenant_id: key.tenant_id.clone(),
                key_id: key.key_id.clone(),
                subscription: Subscription::default(),
            },
        );
        tracing::debug!(connection = connection_id, tenant = %key.tenant_id, "bridge connected");
    }

    /// `POST /ws/disconnect`.
    pub async fn unregister(&self, connection_id: &str) {
        self.table.lock().await.remove(connection_id);
        tracing::debug!(connection = connection_id, "bridge disconnected");
    }

    pub async fn is_registered(&self, connection_id: &str) -> bool {
        self.table
            .lock()
            .await
            .connections
            .contains_key(connection_id)
    }

    pub async fn connection_count(&self) -> usize {
        self.table.lock().await.connections.len()
    }

    /// `POST /ws/message`: defensive re-registration, then dispatch.
    ///
    /// Returns false when the connection is unknown and the message carried
    /// no usable token (the gateway should drop it).
    pub async fn handle_message(
        &self,
        store: &Store,
        connection_id: &str,
        message: &ClientMessage,
    ) -> bool {
        if !self.is_registered(connection_id).await {
            let Some(key) = authenticate(store, message.token.as_deref()).await else {
                tracing::warn!(
                    connection = connection_id,
                    "bridge message for unknown connection without valid token"
                );
                return false;
            };
            self.register(connection_id, &key).await;
        }

        match message.action {
            ClientAction::Subscribe => {
                let mut table = self.table.lock().await;
                if let Some(connection) = table.connections.get_mut(connection_id) {
                    connection
                        .subscription
                        .subscribe(&message.channels, message.filters.clone());
                }
                true
            }
            ClientAction::Unsubscribe => {
                let mut table = self.table.lock().await;
                if let Some(connection) = table.connections.get_mut(connection_id) {
                    connection.subscription.unsubscribe(&message.channels);
                }
                true
            }
            ClientAction::Ping => {
                self.send_to(connection_id, &ServerMessage::Pong).await;
                true
            }
        }
    }

    pub async fn subscription(&self, connection_id: &str) -> Option<Subscription> {
        self.table
            .lock()
            .await
            .connections
            .get(connection_id)
            .map(|c| c.subscription.clone())
    }

    /// Push one frame through the gateway management API. A "gone" response
    /// means the socket is dead; unregister it.
    async fn send_to(&self, connection_id: &str, message: &ServerMessage) {
        let url = format!("{}/@connections/{}", self.endpoint, connection_id);
        match self.client.post(&url).json(message).send().await {
            Ok(response) if response.status() == reqwest::StatusCode::GONE => {
                tracing::debug!(connection = connection_id, "gateway reports connection gone");
                self.unregister(connection_id).await;
            }
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(
                    connection = connection_id,
                    status = %response.status(),
                    "gateway send failed"
                );
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(connection = connection_id, error = %err, "gateway unreachable");
            }
        }
    }

    /// Snapshot the tenant's matching connection ids before sending so the
    /// table lock is never held across outbound POSTs.
    async fn matching_connections<F>(&self, tenant_id: &str, select: F) -> Vec<String>
    where
        F: Fn(&Subscription) -> bool,
    {
        let table = self.table.lock().await;
        let Some(ids) = table.by_tenant.get(tenant_id) else {
            return Vec::new();
        };
        ids.iter()
            .filter(|id| {
                table
                    .connections
                    .get(*id)
                    .map(|c| select(&c.subscription))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }
}

async fn authenticate(store: &Store, token: Option<&str>) -> Option<ApiKey> {
    let token = token?;
    store.find_key_by_hash(&ApiKey::hash_raw(token)).await
}

#[async_trait]
impl Broadcaster for BridgeBus {
    async fn broadcast_events(&self, tenant_id: &str, events: &[Event]) {
        for event in events {
            let targets = self
                .matching_connections(tenant_id, |sub| sub.matches_event(event))
                .await;
            let message = ServerMessage::EventNew(event.clone());
            for connection_id in targets {
                self.send_to(&connection_id, &message).await;
            }
        }
    }

    async fn broadcast_agent_status_change(&self, tenant_id: &str, change: &StatusChange) {
        let targets = self
            .matching_connections(tenant_id, Subscription::wants_agent_messages)
            .await;
        let message = ServerMessage::AgentStatusChanged(change.clone());
        for connection_id in targets {
            self.send_to(&connection_id, &message).await;
        }
    }

    async fn broadcast_agent_stuck(&self, tenant_id: &str, notice: &StuckNotice) {
        let targets = self
            .matching_connections(tenant_id, Subscription::wants_agent_messages)
            .await;
        let message = ServerMessage::AgentStuck(notice.clone());
        for connection_id in targets {
            self.send_to(&connection_id, &message).await;
        }
    }

    async fn clear_stuck(&self, tenant_id: &str, agent_id: &str) {
        let targets = self
            .matching_connections(tenant_id, Subscription::wants_agent_messages)
            .await;
        let message = ServerMessage::AgentStuckCleared {
            agent_id: agent_id.to_string(),
        };
        for connection_id in targets {
            self.send_to(&connection_id, &message).await;
        }
    }
}
