//! Rostrum configuration.
//!
//! Configuration is loaded from environment variables. The Redis URL may
//! carry credentials and is redacted in Debug output.

use crate::state::DeviceRole;
use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use thiserror::Error;

/// Default HTTP bind address (gateway, state query, health, metrics).
pub const DEFAULT_HTTP_BIND_ADDRESS: &str = "0.0.0.0:8000";

/// Default bus channel prefix.
pub const DEFAULT_TOPIC_PREFIX: &str = "conference/";

/// Default base URL of the main controller's HTTP surface, used by the
/// backup for reconciliation pulls.
pub const DEFAULT_MAIN_BASE_URL: &str = "http://localhost:8000";

/// Default heartbeat/failover tick period in seconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECONDS: u64 = 5;

/// Default heartbeat silence before the backup takes over, in seconds.
pub const DEFAULT_FAILOVER_TIMEOUT_SECONDS: u64 = 15;

/// Default system health sampling period in seconds.
pub const DEFAULT_HEALTH_INTERVAL_SECONDS: u64 = 30;

/// Default reconciliation pull timeout in seconds.
pub const DEFAULT_RECONCILE_TIMEOUT_SECONDS: u64 = 2;

/// Default per-viewer-session write timeout in seconds.
pub const DEFAULT_VIEWER_WRITE_TIMEOUT_SECONDS: u64 = 5;

/// Default deck size.
pub const DEFAULT_TOTAL_SLIDES: u32 = 30;

/// Rostrum configuration, loaded from environment variables with
/// sensible defaults. `REDIS_URL` is the only required variable.
#[derive(Clone)]
pub struct Config {
    /// Redis connection URL (replication bus broker).
    /// Protected by `SecretString` to prevent accidental logging.
    pub redis_url: SecretString,

    /// Which controller this process is (default: main).
    pub role: DeviceRole,

    /// Unique identifier for this controller instance.
    pub device_id: String,

    /// Bus channel prefix (default: "conference/").
    pub topic_prefix: String,

    /// HTTP bind address (default: "0.0.0.0:8000").
    pub http_bind_address: String,

    /// Main controller base URL for reconciliation pulls (backup only).
    pub main_base_url: String,

    /// Heartbeat/failover tick period in seconds (default: 5).
    pub heartbeat_interval_seconds: u64,

    /// Heartbeat silence before failover in seconds (default: 15).
    pub failover_timeout_seconds: u64,

    /// System health sampling period in seconds (default: 30).
    pub health_interval_seconds: u64,

    /// Reconciliation pull timeout in seconds (default: 2).
    pub reconcile_timeout_seconds: u64,

    /// Per-viewer write timeout in seconds (default: 5).
    pub viewer_write_timeout_seconds: u64,

    /// Slide deck size (default: 30).
    pub total_slides: u32,
}

/// Custom Debug implementation that redacts the broker URL.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("redis_url", &"[REDACTED]")
            .field("role", &self.role)
            .field("device_id", &self.device_id)
            .field("topic_prefix", &self.topic_prefix)
            .field("http_bind_address", &self.http_bind_address)
            .field("main_base_url", &self.main_base_url)
            .field("heartbeat_interval_seconds", &self.heartbeat_interval_seconds)
            .field("failover_timeout_seconds", &self.failover_timeout_seconds)
            .field("health_interval_seconds", &self.health_interval_seconds)
            .field("reconcile_timeout_seconds", &self.reconcile_timeout_seconds)
            .field(
                "viewer_write_timeout_seconds",
                &self.viewer_write_timeout_seconds,
            )
            .field("total_slides", &self.total_slides)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let redis_url = SecretString::from(
            vars.get("REDIS_URL")
                .ok_or_else(|| ConfigError::MissingEnvVar("REDIS_URL".to_string()))?
                .clone(),
        );

        let role = match vars.get("ROSTRUM_ROLE").map(String::as_str) {
            None | Some("main") | Some("MAIN") => DeviceRole::Main,
            Some("backup") | Some("BACKUP") => DeviceRole::Backup,
            Some(other) => {
                return Err(ConfigError::InvalidValue(format!(
                    "ROSTRUM_ROLE must be 'main' or 'backup', got '{other}'"
                )))
            }
        };

        let topic_prefix = vars
            .get("ROSTRUM_TOPIC_PREFIX")
            .cloned()
            .unwrap_or_else(|| DEFAULT_TOPIC_PREFIX.to_string());

        let http_bind_address = vars
            .get("ROSTRUM_HTTP_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HTTP_BIND_ADDRESS.to_string());

        let main_base_url = vars
            .get("ROSTRUM_MAIN_BASE_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_MAIN_BASE_URL.to_string());

        let heartbeat_interval_seconds = vars
            .get("ROSTRUM_HEARTBEAT_INTERVAL_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_SECONDS);

        let failover_timeout_seconds = vars
            .get("ROSTRUM_FAILOVER_TIMEOUT_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_FAILOVER_TIMEOUT_SECONDS);

        let health_interval_seconds = vars
            .get("ROSTRUM_HEALTH_INTERVAL_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_HEALTH_INTERVAL_SECONDS);

        let reconcile_timeout_seconds = vars
            .get("ROSTRUM_RECONCILE_TIMEOUT_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RECONCILE_TIMEOUT_SECONDS);

        let viewer_write_timeout_seconds = vars
            .get("ROSTRUM_VIEWER_WRITE_TIMEOUT_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_VIEWER_WRITE_TIMEOUT_SECONDS);

        let total_slides = vars
            .get("ROSTRUM_TOTAL_SLIDES")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TOTAL_SLIDES);

        if total_slides == 0 {
            return Err(ConfigError::InvalidValue(
                "ROSTRUM_TOTAL_SLIDES must be at least 1".to_string(),
            ));
        }
        if heartbeat_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "ROSTRUM_HEARTBEAT_INTERVAL_SECONDS must be at least 1".to_string(),
            ));
        }
        if failover_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "ROSTRUM_FAILOVER_TIMEOUT_SECONDS must be at least 1".to_string(),
            ));
        }

        // Generate a device ID unless one was pinned
        let device_id = vars.get("ROSTRUM_DEVICE_ID").cloned().unwrap_or_else(|| {
            let prefix = role.key();
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{prefix}-{short_suffix}")
        });

        Ok(Config {
            redis_url,
            role,
            device_id,
            topic_prefix,
            http_bind_address,
            main_base_url,
            heartbeat_interval_seconds,
            failover_timeout_seconds,
            health_interval_seconds,
            reconcile_timeout_seconds,
            viewer_write_timeout_seconds,
            total_slides,
        })
    }
}
