use std::sync::Arc;

use hiveboard_engine::StuckTracker;
use hiveboard_store::Store;
use tokio::sync::Mutex;

use crate::broadcast::{BridgeBus, Broadcaster, NativeBus};
use crate::config::ServerConfig;
use crate::rate_limit::RateLimiter;

/// Shared application state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub config: Arc<ServerConfig>,
    /// The one surface ingestion talks to, whichever back-end is active
    pub bus: Arc<dyn Broadcaster>,
    /// Present in local mode: the in-process WebSocket manager
    pub native: Option<Arc<NativeBus>>,
    /// Present in production mode: the gateway bridge
    pub bridge: Option<Arc<BridgeBus>>,
    pub rate_limiter: Arc<RateLimiter>,
    pub stuck: Arc<Mutex<StuckTracker>>,
}

impl AppState {
    pub fn with_native(store: Arc<Store>, config: Arc<ServerConfig>, native: Arc<NativeBus>) -> Self {
        Self {
            store,
            config,
            bus: native.clone(),
            native: Some(native),
            bridge: None,
            rate_limiter: Arc::new(RateLimiter::new()),
            stuck: Arc::new(Mutex::new(StuckTracker::new())),
        }
    }

    pub fn with_bridge(store: Arc<Store>, config: Arc<ServerConfig>, bridge: Arc<BridgeBus>) -> Self {
        Self {
            store,
            config,
            bus: bridge.clone(),
            native: None,
            bridge: Some(bridge),
            rate_limiter: Arc::new(RateLimiter::new()),
            stuck: Arc::new(Mutex::new(StuckTracker::new())),
        }
    }
}
