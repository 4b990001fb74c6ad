//! Field limits, retention windows and scheduling constants.

/// Hard cap on events per ingestion batch; larger batches are rejected whole.
pub const MAX_BATCH_EVENTS: usize = 500;

/// agent_id and task_id are truncated to this many characters (with warning).
pub const MAX_ID_LEN: usize = 256;

/// environment is truncated to this many characters (with warning).
pub const MAX_ENVIRONMENT_LEN: usize = 64;

/// group is truncated to this many characters (with warning).
pub const MAX_GROUP_LEN: usize = 128;

/// payload.summary is truncated to this many characters (with warning).
pub const MAX_SUMMARY_LEN: usize = 512;

/// Serialized payload JSON above this size rejects that event only.
pub const MAX_PAYLOAD_BYTES: usize = 32 * 1024;

/// Heartbeats older than this are cold-pruned; stuck detection reads the
/// agent cache's last_heartbeat, never historical heartbeat rows.
pub const HEARTBEAT_RETENTION_SECONDS: i64 = 10 * 60;

/// action_started carries no duration; the completion event carries the
/// outcome, so starts are cold-pruned after a day.
pub const ACTION_STARTED_RETENTION_SECONDS: i64 = 24 * 60 * 60;

/// Background prune cadence.
pub const PRUNE_INTERVAL_SECONDS: u64 = 300;

/// Default stuck threshold; overridable via configuration.
pub const DEFAULT_STUCK_THRESHOLD_SECONDS: u64 = 300;

/// An agent with no activity for this long is offline.
pub const OFFLINE_AFTER_SECONDS: i64 = 24 * 60 * 60;

/// Native WebSocket ping cadence; a pong is expected within the next interval.
pub const WS_PING_INTERVAL_SECONDS: u64 = 30;

/// Window for the per-agent rolling stats joined onto agent listings.
pub const AGENT_STATS_WINDOW_SECONDS: i64 = 60 * 60;

/// Default page size for event queries.
pub const DEFAULT_QUERY_LIMIT: usize = 100;

/// Largest page size a client may request.
pub const MAX_QUERY_LIMIT: usize = 1000;
