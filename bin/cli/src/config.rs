//! Client configuration.
//!
//! Composed from library configs and loaded via the `config` crate from
//! `STOCKROOM_*` environment variables, with `__` separating sections:
//!
//! - `STOCKROOM_API__BASE_URL`, `STOCKROOM_API__TIMEOUT_SECS`
//! - `STOCKROOM_STORAGE__PATH`

use serde::Deserialize;
use std::path::PathBuf;
use stockroom_gateway::GatewayConfig;

/// Client configuration composed from library configs.
#[derive(Debug, Default, Deserialize)]
pub struct ClientConfig {
    /// Backend endpoint configuration.
    #[serde(default)]
    pub api: GatewayConfig,

    /// Where the session is kept between invocations.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Durable session storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path of the session file.
    /// Default: "./stockroom-session.json"
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("stockroom-session.json")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl ClientConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::from_environment(config::Environment::with_prefix("STOCKROOM"))
    }

    fn from_environment(environment: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                environment
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> ClientConfig {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ClientConfig::from_environment(
            config::Environment::with_prefix("STOCKROOM").source(Some(source)),
        )
        .expect("config")
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]);
        assert_eq!(config.api.base_url(), "http://127.0.0.1:8000/api");
        assert_eq!(config.storage.path, PathBuf::from("stockroom-session.json"));
    }

    #[test]
    fn reads_nested_sections() {
        let config = load(&[
            ("STOCKROOM_API__BASE_URL", "https://inventario.example.com/api/"),
            ("STOCKROOM_API__TIMEOUT_SECS", "5"),
            ("STOCKROOM_STORAGE__PATH", "/tmp/session.json"),
            ("STOCKROOM_PASSWORD", "ignored"),
        ]);
        assert_eq!(config.api.base_url(), "https://inventario.example.com/api");
        assert_eq!(config.api.timeout().as_secs(), 5);
        assert_eq!(config.storage.path, PathBuf::from("/tmp/session.json"));
    }
}
