use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::Deserialize;

use hiveboard_types::DEFAULT_STUCK_THRESHOLD_SECONDS;

/// Deployment mode. `local` serves WebSockets in-process with permissive
/// CORS; `production` disables CORS and routes live updates through the
/// external gateway bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Local,
    Production,
}

/// Process configuration, loaded once from a JSON file at startup.
///
/// The dev bootstrap key comes from here (or from the environment), never
/// from source, so the server can run from a read-only image.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub mode: Mode,
    pub listen: String,
    pub ws_gateway_endpoint: Option<String>,
    pub ws_gateway_region: Option<String>,
    pub dev_key: Option<String>,
    pub jwt_secret: Option<String>,
    pub jwt_expiry: Option<u64>,
    pub stuck_threshold_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            mode: Mode::Local,
            listen: "127.0.0.1:8787".to_string(),
            ws_gateway_endpoint: None,
            ws_gateway_region: None,
            dev_key: None,
            jwt_secret: None,
            jwt_expiry: None,
            stuck_threshold_seconds: DEFAULT_STUCK_THRESHOLD_SECONDS,
        }
    }
}

impl ServerConfig {
    /// Load from a JSON file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: ServerConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.mode == Mode::Production && self.ws_gateway_endpoint.is_none() {
            anyhow::bail!("production mode requires ws_gateway_endpoint");
        }
        if self.stuck_threshold_seconds == 0 {
            anyhow::bail!("stuck_threshold_seconds must be positive");
        }
        Ok(())
    }

    pub fn stuck_threshold(&self) -> Duration {
        Duration::seconds(self.stuck_threshold_seconds as i64)
    }
}
