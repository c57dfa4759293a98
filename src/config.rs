//! Launch configuration.
//!
//! A launch file is a small TOML document:
//!
//! ```toml
//! id = "redis"
//! image = "docker.io/library/redis:alpine"
//!
//! [network]
//! host = true
//! ```
//!
//! `id` and `image` are required. The `[network]` table is optional and
//! defaults to an isolated network namespace.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Network placement of the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkMode {
    /// Private network namespace created by the runtime.
    #[default]
    Isolated,
    /// Share the host's network namespace, hosts and resolv.conf.
    Host,
}

impl std::fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Isolated => write!(f, "isolated"),
            Self::Host => write!(f, "host"),
        }
    }
}

/// A validated launch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Container ID, unique within the runtime namespace.
    pub id: String,
    /// Image reference, e.g. `registry/name:tag`.
    pub image: String,
    /// Network placement.
    pub network: NetworkMode,
}

/// On-disk shape of the launch file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    id: String,
    #[serde(default)]
    image: String,
    #[serde(default)]
    network: RawNetwork,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawNetwork {
    #[serde(default)]
    host: bool,
}

impl LaunchConfig {
    /// Builds a config with an isolated network.
    pub fn new(id: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            image: image.into(),
            network: NetworkMode::Isolated,
        }
    }

    /// Sets the network mode.
    pub fn with_network(mut self, network: NetworkMode) -> Self {
        self.network = network;
        self
    }

    /// Loads and validates a launch file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path.to_path_buf())
    }

    /// Parses a launch file held in memory.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, PathBuf::from("<inline>"))
    }

    fn parse(content: &str, path: PathBuf) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            toml::from_str(content).map_err(|source| ConfigError::Parse { path, source })?;

        let id = raw.id.trim();
        if id.is_empty() {
            return Err(ConfigError::MissingField("id"));
        }
        let image = raw.image.trim();
        if image.is_empty() {
            return Err(ConfigError::MissingField("image"));
        }

        Ok(Self {
            id: id.to_string(),
            image: image.to_string(),
            network: if raw.network.host {
                NetworkMode::Host
            } else {
                NetworkMode::Isolated
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_is_isolated() {
        let config = LaunchConfig::from_toml_str(
            r#"
            id = "c1"
            image = "repo/app:1.0"
            "#,
        )
        .unwrap();

        assert_eq!(config, LaunchConfig::new("c1", "repo/app:1.0"));
        assert_eq!(config.network, NetworkMode::Isolated);
    }

    #[test]
    fn test_host_network() {
        let config = LaunchConfig::from_toml_str(
            r#"
            id = "dns"
            image = "coredns/coredns:1.11"

            [network]
            host = true
            "#,
        )
        .unwrap();

        assert_eq!(config.network, NetworkMode::Host);
    }

    #[test]
    fn test_host_false_is_isolated() {
        let config = LaunchConfig::from_toml_str(
            "id = \"c1\"\nimage = \"a:b\"\n[network]\nhost = false\n",
        )
        .unwrap();
        assert_eq!(config.network, NetworkMode::Isolated);
    }

    #[test]
    fn test_missing_fields() {
        let err = LaunchConfig::from_toml_str("image = \"a:b\"").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("id")));

        let err = LaunchConfig::from_toml_str("id = \"c1\"").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("image")));

        let err = LaunchConfig::from_toml_str("id = \"  \"\nimage = \"a:b\"").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("id")));
    }

    #[test]
    fn test_malformed() {
        let err = LaunchConfig::from_toml_str("id = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));

        let err = LaunchConfig::from_toml_str("id = \"c1\"\nimage = \"a:b\"\nimgae = \"x\"")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
