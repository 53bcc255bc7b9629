// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::sanitizer::SafeName;

/// Label stamped on every container the engine creates.
pub const APP_LABEL: &str = "homeport.app";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => f.write_str("tcp"),
            Protocol::Udp => f.write_str("udp"),
        }
    }
}

/// A validated host -> container port publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortBinding {
    pub host: u16,
    pub container: u16,
    #[serde(default)]
    pub protocol: Protocol,
}

impl PortBinding {
    /// `host:container/proto`, as accepted by `docker run -p`.
    pub fn publish_spec(&self) -> String {
        format!("{}:{}/{}", self.host, self.container, self.protocol)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMount {
    pub host: PathBuf,
    pub container: String,
    pub read_only: bool,
}

impl BindMount {
    pub fn spec(&self) -> String {
        if self.read_only {
            format!("{}:{}:ro", self.host.display(), self.container)
        } else {
            format!("{}:{}", self.host.display(), self.container)
        }
    }
}

/// Everything needed to create a single-container app. Every string in here
/// has already been through the sanitizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: SafeName,
    pub image: SafeName,
    pub ports: Vec<PortBinding>,
    pub mounts: Vec<BindMount>,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerAction {
    Start,
    Stop,
    Restart,
    Pause,
    Unpause,
}

impl ContainerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerAction::Start => "start",
            ContainerAction::Stop => "stop",
            ContainerAction::Restart => "restart",
            ContainerAction::Pause => "pause",
            ContainerAction::Unpause => "unpause",
        }
    }
}

impl fmt::Display for ContainerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(ContainerAction::Start),
            "stop" => Ok(ContainerAction::Stop),
            "restart" => Ok(ContainerAction::Restart),
            "pause" => Ok(ContainerAction::Pause),
            "unpause" => Ok(ContainerAction::Unpause),
            other => Err(format!(
                "Unknown action '{}'. Supported: start, stop, restart, pause, unpause",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Unknown,
}

impl ContainerState {
    pub fn parse(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "created" => ContainerState::Created,
            "running" => ContainerState::Running,
            "paused" => ContainerState::Paused,
            "restarting" => ContainerState::Restarting,
            "removing" => ContainerState::Removing,
            "exited" => ContainerState::Exited,
            "dead" => ContainerState::Dead,
            _ => ContainerState::Unknown,
        }
    }
}

/// One row of `ps`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveContainer {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    /// Human-readable status, e.g. "Up 3 hours".
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerMount {
    pub source: PathBuf,
    pub destination: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDetails {
    pub id: String,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    pub ports: Vec<PortBinding>,
    pub mounts: Vec<ContainerMount>,
    pub env: BTreeMap<String, String>,
}

/// A compose project rooted at a stack directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeProject {
    pub name: SafeName,
    pub dir: PathBuf,
}

impl ComposeProject {
    pub const COMPOSE_FILE: &'static str = "docker-compose.yml";
    pub const ENV_FILE: &'static str = ".env";

    pub fn compose_file(&self) -> PathBuf {
        self.dir.join(Self::COMPOSE_FILE)
    }

    pub fn env_file(&self) -> PathBuf {
        self.dir.join(Self::ENV_FILE)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr.trim_end()),
            (false, true) => self.stdout.trim_end().to_string(),
            (true, false) => self.stderr.trim_end().to_string(),
            (true, true) => String::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to spawn `{command}`: {message}")]
    SpawnFailed { command: String, message: String },

    #[error("`{command}` timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("`{command}` exited with status {code:?}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("Container not found: {0}")]
    NotFound(String),

    #[error("Failed to parse runtime output: {0}")]
    Parse(String),
}

impl RuntimeError {
    /// Diagnostic output to hand back to the operator, when there is any.
    pub fn output(&self) -> Option<&str> {
        match self {
            RuntimeError::CommandFailed { output, .. } => Some(output.as_str()),
            _ => None,
        }
    }
}

/// Host container runtime. Implementations receive only sanitized names.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create and start a container, returning its id.
    async fn run(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    async fn inspect(&self, name: &SafeName) -> Result<ContainerDetails, RuntimeError>;

    async fn inspect_mounts(&self, name: &SafeName) -> Result<Vec<ContainerMount>, RuntimeError> {
        Ok(self.inspect(name).await?.mounts)
    }

    async fn control(
        &self,
        name: &SafeName,
        action: ContainerAction,
    ) -> Result<CommandOutput, RuntimeError>;

    /// Force-remove a container.
    async fn remove(&self, name: &SafeName) -> Result<CommandOutput, RuntimeError>;

    async fn compose_up(&self, project: &ComposeProject) -> Result<CommandOutput, RuntimeError>;

    async fn compose_down(&self, project: &ComposeProject) -> Result<CommandOutput, RuntimeError>;

    /// All containers, running or not.
    async fn ps(&self) -> Result<Vec<LiveContainer>, RuntimeError>;

    async fn logs(&self, name: &SafeName, tail: usize) -> Result<CommandOutput, RuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_and_bind_specs() {
        let port = PortBinding {
            host: 8080,
            container: 80,
            protocol: Protocol::Tcp,
        };
        assert_eq!(port.publish_spec(), "8080:80/tcp");

        let mount = BindMount {
            host: PathBuf::from("/data/containers/plex"),
            container: "/config".to_string(),
            read_only: false,
        };
        assert_eq!(mount.spec(), "/data/containers/plex:/config");
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!("pause".parse::<ContainerAction>(), Ok(ContainerAction::Pause));
        assert!("kill".parse::<ContainerAction>().is_err());
    }

    #[test]
    fn test_state_parsing() {
        assert_eq!(ContainerState::parse("Running"), ContainerState::Running);
        assert_eq!(ContainerState::parse("exited"), ContainerState::Exited);
        assert_eq!(ContainerState::parse("weird"), ContainerState::Unknown);
    }

    #[test]
    fn test_combined_output() {
        let out = CommandOutput {
            stdout: "abc\n".to_string(),
            stderr: String::new(),
        };
        assert_eq!(out.combined(), "abc");
    }
}
