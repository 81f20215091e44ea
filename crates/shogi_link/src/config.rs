//! Runtime configuration: TOML file, environment overlay, CLI overrides.

use crate::{ConfigError, Difficulty, EvictionPolicy};
use derive_getters::Getters;
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Environment variable overriding [`LinkConfig::port`].
pub const ENV_PORT: &str = "SHOGI_LINK_PORT";
/// Environment variable overriding [`LinkConfig::allowed_origins`] (comma separated).
pub const ENV_ALLOWED_ORIGINS: &str = "SHOGI_LINK_ALLOWED_ORIGINS";
/// Environment variable overriding [`LinkConfig::dev_mode`].
pub const ENV_DEV: &str = "SHOGI_LINK_DEV";
/// Environment variable overriding [`LinkConfig::server_url`].
pub const ENV_SERVER_URL: &str = "SHOGI_LINK_SERVER_URL";

/// Settings shared by the server and the play front-end.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
#[serde(default)]
pub struct LinkConfig {
    /// Address the server binds to.
    #[setters(into)]
    host: String,

    /// Port the server listens on.
    port: u16,

    /// Browser origins allowed by CORS outside dev mode.
    allowed_origins: Vec<String>,

    /// Allow any origin.
    dev_mode: bool,

    /// Seconds a never-joined session survives untouched.
    waiting_ttl_secs: u64,

    /// Seconds an active or ended session survives untouched.
    idle_ttl_secs: u64,

    /// Seconds between eviction sweeps.
    sweep_interval_secs: u64,

    /// Milliseconds between move-log polls on the client.
    poll_interval_ms: u64,

    /// Session server the client talks to.
    #[setters(into)]
    server_url: String,

    /// Default engine strength.
    difficulty: Difficulty,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            allowed_origins: vec!["http://localhost:5173".to_string()],
            dev_mode: false,
            waiting_ttl_secs: 30 * 60,
            idle_ttl_secs: 2 * 60 * 60,
            sweep_interval_secs: 60,
            poll_interval_ms: 1000,
            server_url: "http://127.0.0.1:3001".to_string(),
            difficulty: Difficulty::Medium,
        }
    }
}

impl LinkConfig {
    /// Loads configuration from a TOML file. Missing keys take defaults.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;

        info!(port = config.port, dev_mode = config.dev_mode, "Config loaded successfully");
        Ok(config)
    }

    /// File config when `path` exists, defaults otherwise, then the environment overlay.
    #[instrument(skip(path))]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            Some(path) => {
                info!("Config file not found at {}, using defaults", path.display());
                Self::default()
            }
            None => Self::default(),
        };
        base.apply_env()
    }

    /// Overlays `SHOGI_LINK_*` variables from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlays `SHOGI_LINK_*` variables read through `lookup`.
    pub fn apply_env_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(port) = lookup(ENV_PORT) {
            self.port = port
                .trim()
                .parse()
                .map_err(|e| ConfigError::new(format!("Invalid {}: {} ({})", ENV_PORT, port, e)))?;
        }
        if let Some(origins) = lookup(ENV_ALLOWED_ORIGINS) {
            self.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
            if self.allowed_origins.is_empty() {
                warn!("{} is empty; all browser origins will be rejected", ENV_ALLOWED_ORIGINS);
            }
        }
        if let Some(dev) = lookup(ENV_DEV) {
            self.dev_mode = matches!(dev.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
        if let Some(url) = lookup(ENV_SERVER_URL) {
            self.server_url = url.trim().to_string();
        }
        Ok(self)
    }

    /// Session expiry derived from the TTL settings.
    pub fn eviction_policy(&self) -> EvictionPolicy {
        EvictionPolicy::new(
            Duration::from_secs(self.waiting_ttl_secs),
            Duration::from_secs(self.idle_ttl_secs),
            Duration::from_secs(self.sweep_interval_secs.max(1)),
        )
    }

    /// Client poll period.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(50))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overlay() {
        let env: HashMap<&str, &str> = [
            (ENV_PORT, "4100"),
            (ENV_ALLOWED_ORIGINS, "https://a.example, https://b.example"),
            (ENV_DEV, "true"),
        ]
        .into_iter()
        .collect();
        let config = LinkConfig::default()
            .apply_env_from(|key| env.get(key).map(|v| v.to_string()))
            .expect("valid overlay");
        assert_eq!(*config.port(), 4100);
        assert_eq!(
            config.allowed_origins(),
            &vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(*config.dev_mode());
    }

    #[test]
    fn test_bad_port_is_config_error() {
        let result = LinkConfig::default()
            .apply_env_from(|key| (key == ENV_PORT).then(|| "not-a-port".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_setters_chain() {
        let config = LinkConfig::default().with_port(9000).with_dev_mode(true);
        assert_eq!(*config.port(), 9000);
        assert!(*config.dev_mode());
    }
}
