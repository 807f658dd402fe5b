use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the revision resolver stamps incoming edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RevisionMode {
    /// Trust the caller-supplied, wall-clock derived stamp.
    Client,
    /// Ignore the caller stamp and assign `current + 1` on arrival.
    Server,
}

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins, comma separated
    pub cors_origins: Option<String>,

    /// Log level of this crate, used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    // Cloud service identifiers
    #[serde(default = "default_service_name")]
    pub cloud_service_name: String,

    /// JWT secret key
    pub cloud_auth_jwt_secret: Option<String>,

    /// Database URL
    pub db_url: Option<String>,

    /// Base URL of the room persistence service, used when no database is configured
    pub store_service_url: Option<String>,

    /// Quiet period after the last edit before a session is checkpointed
    #[serde(default = "default_checkpoint_debounce_ms")]
    pub checkpoint_debounce_ms: u64,

    /// Per-session broadcast channel capacity
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,

    #[serde(default = "default_revision_mode")]
    pub revision_mode: RevisionMode,

    /// Tell the proposer when its edit lost against a newer revision
    #[serde(default)]
    pub notify_stale_edits: bool,

    /// Create sessions on join when no durable record exists
    #[serde(default = "default_auto_create_sessions")]
    pub auto_create_sessions: bool,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        // Load from environment variables using envy
        // Runs before tracing is set up, callers log the outcome
        envy::from_env::<Config>().map_err(ConfigError::EnvError)
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn checkpoint_debounce(&self) -> Duration {
        Duration::from_millis(self.checkpoint_debounce_ms)
    }

    /// Parsed CORS origins, empty when any origin is allowed
    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Default tracing filter: `log_level` for this crate, info for the rest
    pub fn log_filter(&self) -> String {
        format!(
            "colabri_room={},tower_http=debug,axum::rejection=trace,info",
            self.log_level.trim().to_lowercase()
        )
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            cloud_service_name: default_service_name(),
            cloud_auth_jwt_secret: None,
            db_url: None,
            store_service_url: None,
            checkpoint_debounce_ms: default_checkpoint_debounce_ms(),
            broadcast_capacity: default_broadcast_capacity(),
            revision_mode: default_revision_mode(),
            notify_stale_edits: false,
            auto_create_sessions: default_auto_create_sessions(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_log_level() -> String {
    "debug".to_string()
}

fn default_service_name() -> String {
    "colabri-room".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_checkpoint_debounce_ms() -> u64 {
    1500
}

fn default_broadcast_capacity() -> usize {
    256
}

fn default_revision_mode() -> RevisionMode {
    RevisionMode::Client
}

fn default_auto_create_sessions() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.server_address(), "0.0.0.0:5000");
        assert_eq!(config.checkpoint_debounce(), Duration::from_millis(1500));
        assert_eq!(config.revision_mode, RevisionMode::Client);
        assert!(config.auto_create_sessions);
        assert!(!config.notify_stale_edits);
    }

    #[test]
    fn cors_origins_are_split_and_trimmed() {
        let config = Config {
            cors_origins: Some("http://localhost:5173, https://rooms.example.com,".to_string()),
            ..Config::default()
        };
        assert_eq!(
            config.cors_origin_list(),
            vec!["http://localhost:5173".to_string(), "https://rooms.example.com".to_string()]
        );
        assert!(Config::default().cors_origin_list().is_empty());
    }

    #[test]
    fn log_level_drives_the_default_filter() {
        assert_eq!(
            Config::default().log_filter(),
            "colabri_room=debug,tower_http=debug,axum::rejection=trace,info"
        );
        let config = Config {
            log_level: " WARN ".to_string(),
            ..Config::default()
        };
        assert!(config.log_filter().starts_with("colabri_room=warn,"));
    }

    #[test]
    fn revision_mode_parses_lowercase() {
        let mode: RevisionMode = serde_json::from_str("\"server\"").unwrap();
        assert_eq!(mode, RevisionMode::Server);
    }
}
