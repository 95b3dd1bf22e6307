//! Gateway configuration.
//!
//! The base endpoint is read from the environment, falling back to the local
//! development backend when unset.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Base endpoint used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api";

/// Configuration for the API gateway client.
///
/// Fields with defaults can be omitted when loading from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base endpoint every request path is resolved against.
    /// Default: "http://127.0.0.1:8000/api"
    #[serde(default = "default_base_url")]
    base_url: String,
    /// Per-request timeout in seconds.
    /// Default: 30
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GatewayConfig {
    /// Creates a configuration for the given base endpoint.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Loads the configuration from `STOCKROOM_API__*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_environment(config::Environment::with_prefix("STOCKROOM_API"))
    }

    fn from_environment(environment: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                environment
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Returns the base endpoint without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn environment(vars: &[(&str, &str)]) -> config::Environment {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        config::Environment::with_prefix("STOCKROOM_API").source(Some(source))
    }

    #[test]
    fn defaults_point_at_local_backend() {
        let config = GatewayConfig::default();
        assert_eq!(config.base_url(), "http://127.0.0.1:8000/api");
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = GatewayConfig::from_environment(environment(&[])).expect("load");
        assert_eq!(config, GatewayConfig::default());
    }

    #[test]
    fn environment_overrides_base_url_and_timeout() {
        let config = GatewayConfig::from_environment(environment(&[
            ("STOCKROOM_API__BASE_URL", "https://inventory.example.com/api/"),
            ("STOCKROOM_API__TIMEOUT_SECS", "5"),
        ]))
        .expect("load");

        assert_eq!(config.base_url(), "https://inventory.example.com/api");
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn builder_style_construction() {
        let config = GatewayConfig::new("http://localhost:9000").with_timeout_secs(2);
        assert_eq!(config.base_url(), "http://localhost:9000");
        assert_eq!(config.timeout(), Duration::from_secs(2));
    }
}
