// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Control-plane configuration
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing:
// - HTTP listener
// - Persisted document directory and default shares root
// - Docker binary, data root and per-operation timeouts
// - Session lifetime
// - Logging

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const API_VERSION: &str = "homeport/v1";
pub const KIND: &str = "ControlPlaneConfig";
pub const CONFIG_PATH_ENV: &str = "HOMEPORT_CONFIG_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    /// Must be "homeport/v1"
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Must be "ControlPlaneConfig"
    pub kind: String,

    pub metadata: ConfigMetadata,

    #[serde(default)]
    pub spec: ControlPlaneSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlPlaneSpec {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub docker: DockerRuntimeConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding users.json, sessions.json, shares.json, docker.json
    /// and apps.json.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Parent of shared folders created without an explicit path.
    #[serde(default = "default_shares_root")]
    pub shares_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            shares_root: default_shares_root(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerRuntimeConfig {
    /// Docker CLI binary; `compose` is invoked as a subcommand of it.
    #[serde(default = "default_docker_binary")]
    pub binary: String,

    /// Data root used until an administrator configures one.
    #[serde(default = "default_docker_root")]
    pub data_root: PathBuf,

    #[serde(default)]
    pub timeouts: RuntimeTimeouts,

    /// Lines returned by the logs operation when the caller gives none.
    #[serde(default = "default_log_tail")]
    pub default_log_tail: usize,
}

impl Default for DockerRuntimeConfig {
    fn default() -> Self {
        Self {
            binary: default_docker_binary(),
            data_root: default_docker_root(),
            timeouts: RuntimeTimeouts::default(),
            default_log_tail: default_log_tail(),
        }
    }
}

/// Upper bounds for runtime commands. A command that exceeds its bound is
/// killed and reported as an execution error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeTimeouts {
    #[serde(with = "humantime_serde", default = "default_create_timeout")]
    pub create: Duration,

    #[serde(with = "humantime_serde", default = "default_control_timeout")]
    pub control: Duration,

    #[serde(with = "humantime_serde", default = "default_compose_timeout")]
    pub compose: Duration,

    #[serde(with = "humantime_serde", default = "default_teardown_timeout")]
    pub teardown: Duration,
}

impl Default for RuntimeTimeouts {
    fn default() -> Self {
        Self {
            create: default_create_timeout(),
            control: default_control_timeout(),
            compose: default_compose_timeout(),
            teardown: default_teardown_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(with = "humantime_serde", default = "default_session_ttl")]
    pub session_ttl: Duration,

    /// How often expired sessions are purged from the table.
    #[serde(with = "humantime_serde", default = "default_sweep_interval")]
    pub sweep_interval: Duration,

    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl: default_session_ttl(),
            sweep_interval: default_sweep_interval(),
            bcrypt_cost: default_bcrypt_cost(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; RUST_LOG takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8420
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/homeport")
}

fn default_shares_root() -> PathBuf {
    PathBuf::from("/srv/homeport/shares")
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

fn default_docker_root() -> PathBuf {
    PathBuf::from("/var/lib/homeport/docker")
}

fn default_log_tail() -> usize {
    200
}

fn default_create_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_control_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_compose_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_teardown_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_session_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_bcrypt_cost() -> u32 {
    12
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ConfigMetadata {
                name: "homeport".to_string(),
                labels: None,
            },
            spec: ControlPlaneSpec::default(),
        }
    }
}

impl ControlPlaneConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Discover configuration file using precedence order
    /// 1. HOMEPORT_CONFIG_PATH environment variable
    /// 2. ./homeport-config.yaml (working directory)
    /// 3. ~/.homeport/config.yaml (user home)
    /// 4. /etc/homeport/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./homeport-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".homeport").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/homeport/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default.
    ///
    /// An explicit path must exist and parse; discovered files and defaults
    /// are best-effort. Environment overrides are applied in every case.
    pub fn load_or_default(cli_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = cli_path {
            tracing::info!(path = %path.display(), "Loading configuration from explicit path");
            Self::from_yaml_file(&path)?
        } else if let Some(path) = Self::discover_config() {
            tracing::info!(path = %path.display(), "Loading configuration from discovered path");
            Self::from_yaml_file(&path)?
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("HOMEPORT_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: HOMEPORT_PORT={}", port);
                    self.spec.server.port = port;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for HOMEPORT_PORT: '{}'. Expected a port number. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Some(val) = lookup("HOMEPORT_BIND") {
            tracing::info!("Environment override: HOMEPORT_BIND={}", val);
            self.spec.server.bind_address = val;
        }

        if let Some(val) = lookup("HOMEPORT_DATA_DIR") {
            tracing::info!("Environment override: HOMEPORT_DATA_DIR={}", val);
            self.spec.storage.data_dir = PathBuf::from(val);
        }

        if let Some(val) = lookup("HOMEPORT_DOCKER_BIN") {
            tracing::info!("Environment override: HOMEPORT_DOCKER_BIN={}", val);
            self.spec.docker.binary = val;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_version != API_VERSION {
            return Err(ConfigError::Invalid(format!(
                "apiVersion '{}' must be '{}'",
                self.api_version, API_VERSION
            )));
        }

        if self.kind != KIND {
            return Err(ConfigError::Invalid(format!(
                "kind '{}' must be '{}'",
                self.kind, KIND
            )));
        }

        if self.metadata.name.is_empty() {
            return Err(ConfigError::Invalid("metadata.name cannot be empty".to_string()));
        }

        if self.spec.server.port == 0 {
            return Err(ConfigError::Invalid("spec.server.port cannot be 0".to_string()));
        }

        for (field, path) in [
            ("spec.storage.data_dir", &self.spec.storage.data_dir),
            ("spec.storage.shares_root", &self.spec.storage.shares_root),
            ("spec.docker.data_root", &self.spec.docker.data_root),
        ] {
            if !path.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "{} must be an absolute path: {}",
                    field,
                    path.display()
                )));
            }
        }

        if self.spec.docker.binary.trim().is_empty() {
            return Err(ConfigError::Invalid("spec.docker.binary cannot be empty".to_string()));
        }

        let timeouts = &self.spec.docker.timeouts;
        for (field, value) in [
            ("create", timeouts.create),
            ("control", timeouts.control),
            ("compose", timeouts.compose),
            ("teardown", timeouts.teardown),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "spec.docker.timeouts.{} must be non-zero",
                    field
                )));
            }
        }

        if self.spec.auth.session_ttl.is_zero() || self.spec.auth.sweep_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "spec.auth durations must be non-zero".to_string(),
            ));
        }

        if !(4..=31).contains(&self.spec.auth.bcrypt_cost) {
            return Err(ConfigError::Invalid(format!(
                "spec.auth.bcrypt_cost {} must be between 4 and 31",
                self.spec.auth.bcrypt_cost
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_manifest() {
        let config = ControlPlaneConfig::default();
        assert_eq!(config.api_version, API_VERSION);
        assert_eq!(config.kind, KIND);
        assert_eq!(config.spec.docker.timeouts.compose, Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = r#"
apiVersion: homeport/v1
kind: ControlPlaneConfig
metadata:
  name: nas
spec:
  docker:
    timeouts:
      compose: 10m
  auth:
    session_ttl: 12h
"#;
        let config = ControlPlaneConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.metadata.name, "nas");
        assert_eq!(config.spec.docker.timeouts.compose, Duration::from_secs(600));
        assert_eq!(config.spec.docker.timeouts.create, Duration::from_secs(120));
        assert_eq!(config.spec.auth.session_ttl, Duration::from_secs(12 * 3600));
        assert_eq!(config.spec.server.port, 8420);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("HOMEPORT_PORT", "9000"),
            ("HOMEPORT_DATA_DIR", "/tmp/homeport"),
            ("HOMEPORT_DOCKER_BIN", "podman"),
        ]);
        let mut config = ControlPlaneConfig::default();
        config.apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.spec.server.port, 9000);
        assert_eq!(config.spec.storage.data_dir, PathBuf::from("/tmp/homeport"));
        assert_eq!(config.spec.docker.binary, "podman");
        assert_eq!(config.spec.server.bind_address, "0.0.0.0");
    }

    #[test]
    fn test_invalid_port_override_is_ignored() {
        let mut config = ControlPlaneConfig::default();
        config.apply_overrides_from(|key| (key == "HOMEPORT_PORT").then(|| "http".to_string()));
        assert_eq!(config.spec.server.port, 8420);
    }

    #[test]
    fn test_validation() {
        let mut config = ControlPlaneConfig::default();

        config.kind = "NodeConfig".to_string();
        assert!(config.validate().is_err());
        config.kind = KIND.to_string();

        config.spec.storage.data_dir = PathBuf::from("relative");
        assert!(config.validate().is_err());
        config.spec.storage.data_dir = PathBuf::from("/var/lib/homeport");

        config.spec.docker.timeouts.teardown = Duration::ZERO;
        assert!(config.validate().is_err());
        config.spec.docker.timeouts.teardown = Duration::from_secs(1);

        assert!(config.validate().is_ok());
    }
}
