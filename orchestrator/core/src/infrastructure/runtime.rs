// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Docker CLI runtime.
//!
//! Drives the host's `docker` binary (and its `compose` plugin) as child
//! processes. Arguments are always passed as an argv vector, never through a
//! shell, and every invocation runs under its own timeout; a timed-out child
//! is killed when its future is dropped.

use crate::domain::config::RuntimeTimeouts;
use crate::domain::runtime::{
    CommandOutput, ComposeProject, ContainerAction, ContainerDetails, ContainerMount,
    ContainerRuntime, ContainerSpec, ContainerState, LiveContainer, PortBinding, Protocol,
    RuntimeError,
};
use crate::domain::sanitizer::SafeName;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, warn};

pub struct DockerCliRuntime {
    binary: String,
    timeouts: RuntimeTimeouts,
}

impl DockerCliRuntime {
    pub fn new(binary: impl Into<String>, timeouts: RuntimeTimeouts) -> Self {
        Self {
            binary: binary.into(),
            timeouts,
        }
    }

    /// Ask the daemon for its version; fails when the CLI or daemon is missing.
    pub async fn healthcheck(&self) -> Result<String, RuntimeError> {
        let output = self
            .exec(
                vec!["version".into(), "--format".into(), "{{.Server.Version}}".into()],
                self.timeouts.control,
                None,
            )
            .await?;
        Ok(output.stdout.trim().to_string())
    }

    async fn exec(
        &self,
        args: Vec<String>,
        timeout: Duration,
        cwd: Option<&Path>,
    ) -> Result<CommandOutput, RuntimeError> {
        let command = describe(&self.binary, &args);
        debug!(command = %command, "Running docker command");

        let mut cmd = Command::new(&self.binary);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|e| RuntimeError::SpawnFailed {
            command: command.clone(),
            message: e.to_string(),
        })?;

        let started = Instant::now();
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(RuntimeError::SpawnFailed {
                    command,
                    message: e.to_string(),
                })
            }
            Err(_) => {
                warn!(command = %command, timeout_secs = timeout.as_secs(), "Docker command timed out");
                return Err(RuntimeError::Timeout {
                    command,
                    seconds: timeout.as_secs(),
                });
            }
        };

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(
            command = %command,
            status = ?output.status.code(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Docker command finished"
        );

        if output.status.success() {
            Ok(result)
        } else {
            Err(RuntimeError::CommandFailed {
                command,
                code: output.status.code(),
                output: result.combined(),
            })
        }
    }

    fn compose_args(project: &ComposeProject) -> Vec<String> {
        vec![
            "compose".into(),
            "-p".into(),
            project.name.to_string(),
            "-f".into(),
            path_arg(&project.compose_file()),
            "--env-file".into(),
            path_arg(&project.env_file()),
        ]
    }
}

fn describe(binary: &str, args: &[String]) -> String {
    let mut parts = vec![binary.to_string()];
    parts.extend(args.iter().take(2).cloned());
    parts.join(" ")
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// argv for `docker run`, image last.
pub fn run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "run".into(),
        "-d".into(),
        "--name".into(),
        spec.name.to_string(),
        "--restart".into(),
        "unless-stopped".into(),
    ];
    for (key, value) in &spec.labels {
        args.push("--label".into());
        args.push(format!("{}={}", key, value));
    }
    for port in &spec.ports {
        args.push("-p".into());
        args.push(port.publish_spec());
    }
    for mount in &spec.mounts {
        args.push("-v".into());
        args.push(mount.spec());
    }
    for (key, value) in &spec.env {
        args.push("-e".into());
        args.push(format!("{}={}", key, value));
    }
    args.push(spec.image.to_string());
    args
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectDocument {
    id: String,
    name: String,
    config: InspectConfig,
    state: InspectState,
    #[serde(default)]
    host_config: InspectHostConfig,
    #[serde(default)]
    mounts: Option<Vec<InspectMount>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    image: String,
    #[serde(default)]
    env: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectHostConfig {
    #[serde(default)]
    port_bindings: Option<HashMap<String, Option<Vec<InspectHostPort>>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectHostPort {
    #[serde(default)]
    host_port: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectMount {
    #[serde(default)]
    source: String,
    destination: String,
    #[serde(rename = "RW", default)]
    rw: bool,
}

/// Parse `docker inspect` output (a JSON array with one element).
pub fn parse_inspect(json: &str) -> Result<ContainerDetails, RuntimeError> {
    let mut documents: Vec<InspectDocument> =
        serde_json::from_str(json).map_err(|e| RuntimeError::Parse(e.to_string()))?;
    if documents.is_empty() {
        return Err(RuntimeError::Parse("empty inspect result".to_string()));
    }
    let doc = documents.swap_remove(0);

    let mut ports = Vec::new();
    for (key, bindings) in doc.host_config.port_bindings.unwrap_or_default() {
        let (container, protocol) = match key.split_once('/') {
            Some((port, "udp")) => (port, Protocol::Udp),
            Some((port, _)) => (port, Protocol::Tcp),
            None => (key.as_str(), Protocol::Tcp),
        };
        let Ok(container) = container.parse::<u16>() else {
            continue;
        };
        for binding in bindings.unwrap_or_default() {
            if let Ok(host) = binding.host_port.parse::<u16>() {
                let port = PortBinding {
                    host,
                    container,
                    protocol,
                };
                // IPv4 and IPv6 bindings repeat the same pair
                if !ports.contains(&port) {
                    ports.push(port);
                }
            }
        }
    }
    ports.sort_by_key(|p| (p.container, p.host));

    let mounts = doc
        .mounts
        .unwrap_or_default()
        .into_iter()
        .map(|m| ContainerMount {
            source: PathBuf::from(m.source),
            destination: m.destination,
            read_only: !m.rw,
        })
        .collect();

    let env: BTreeMap<String, String> = doc
        .config
        .env
        .unwrap_or_default()
        .into_iter()
        .filter_map(|entry| {
            entry
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect();

    Ok(ContainerDetails {
        id: doc.id,
        name: doc.name.trim_start_matches('/').to_string(),
        image: doc.config.image,
        state: ContainerState::parse(&doc.state.status),
        ports,
        mounts,
        env,
    })
}

#[derive(Debug, Deserialize)]
struct PsRow {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names")]
    names: String,
    #[serde(rename = "Image")]
    image: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Status", default)]
    status: String,
}

/// Parse `docker ps --format '{{json .}}'` output, one object per line.
pub fn parse_ps(output: &str) -> Result<Vec<LiveContainer>, RuntimeError> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let row: PsRow =
                serde_json::from_str(line).map_err(|e| RuntimeError::Parse(e.to_string()))?;
            let name = row.names.split(',').next().unwrap_or_default().to_string();
            // Older engines omit State; derive it from the status text
            let state = if row.state.is_empty() {
                if row.status.starts_with("Up") {
                    ContainerState::Running
                } else {
                    ContainerState::Exited
                }
            } else {
                ContainerState::parse(&row.state)
            };
            Ok(LiveContainer {
                id: row.id,
                name,
                image: row.image,
                state,
                status: row.status,
            })
        })
        .collect()
}

fn is_no_such_container(err: &RuntimeError) -> bool {
    err.output()
        .map(|out| out.contains("No such container") || out.contains("No such object"))
        .unwrap_or(false)
}

#[async_trait]
impl ContainerRuntime for DockerCliRuntime {
    async fn run(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        info!(container = %spec.name, image = %spec.image, "Creating container");
        let output = self.exec(run_args(spec), self.timeouts.create, None).await?;
        Ok(output.stdout.trim().to_string())
    }

    async fn inspect(&self, name: &SafeName) -> Result<ContainerDetails, RuntimeError> {
        let args = vec![
            "inspect".into(),
            "--type".into(),
            "container".into(),
            name.to_string(),
        ];
        match self.exec(args, self.timeouts.control, None).await {
            Ok(output) => parse_inspect(&output.stdout),
            Err(e) if is_no_such_container(&e) => Err(RuntimeError::NotFound(name.to_string())),
            Err(e) => Err(e),
        }
    }

    async fn control(
        &self,
        name: &SafeName,
        action: ContainerAction,
    ) -> Result<CommandOutput, RuntimeError> {
        info!(container = %name, action = %action, "Container action");
        let args = vec![action.as_str().to_string(), name.to_string()];
        match self.exec(args, self.timeouts.control, None).await {
            Err(e) if is_no_such_container(&e) => Err(RuntimeError::NotFound(name.to_string())),
            other => other,
        }
    }

    async fn remove(&self, name: &SafeName) -> Result<CommandOutput, RuntimeError> {
        info!(container = %name, "Removing container");
        let args = vec!["rm".into(), "-f".into(), name.to_string()];
        match self.exec(args, self.timeouts.control, None).await {
            Err(e) if is_no_such_container(&e) => Err(RuntimeError::NotFound(name.to_string())),
            other => other,
        }
    }

    async fn compose_up(&self, project: &ComposeProject) -> Result<CommandOutput, RuntimeError> {
        info!(project = %project.name, dir = %project.dir.display(), "Starting compose stack");
        let mut args = Self::compose_args(project);
        args.extend(["up".into(), "-d".into(), "--remove-orphans".into()]);
        self.exec(args, self.timeouts.compose, Some(&project.dir)).await
    }

    async fn compose_down(&self, project: &ComposeProject) -> Result<CommandOutput, RuntimeError> {
        info!(project = %project.name, "Stopping compose stack");
        let mut args = Self::compose_args(project);
        args.extend(["down".into(), "--remove-orphans".into()]);
        self.exec(args, self.timeouts.teardown, Some(&project.dir)).await
    }

    async fn ps(&self) -> Result<Vec<LiveContainer>, RuntimeError> {
        let args = vec![
            "ps".into(),
            "-a".into(),
            "--no-trunc".into(),
            "--format".into(),
            "{{json .}}".into(),
        ];
        let output = self.exec(args, self.timeouts.control, None).await?;
        parse_ps(&output.stdout)
    }

    async fn logs(&self, name: &SafeName, tail: usize) -> Result<CommandOutput, RuntimeError> {
        let args = vec![
            "logs".into(),
            "--tail".into(),
            tail.to_string(),
            name.to_string(),
        ];
        match self.exec(args, self.timeouts.control, None).await {
            Err(e) if is_no_such_container(&e) => Err(RuntimeError::NotFound(name.to_string())),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::runtime::BindMount;
    use crate::domain::sanitizer::sanitize;

    #[test]
    fn test_run_args_keep_values_separate() {
        let spec = ContainerSpec {
            name: sanitize("plex").unwrap(),
            image: sanitize("linuxserver/plex:latest").unwrap(),
            ports: vec![PortBinding {
                host: 32400,
                container: 32400,
                protocol: Protocol::Tcp,
            }],
            mounts: vec![BindMount {
                host: PathBuf::from("/srv/media"),
                container: "/media/media".to_string(),
                read_only: true,
            }],
            env: BTreeMap::from([("TZ".to_string(), "Europe/Berlin".to_string())]),
            labels: BTreeMap::from([("homeport.app".to_string(), "plex".to_string())]),
        };

        let args = run_args(&spec);
        assert_eq!(args.last().map(String::as_str), Some("linuxserver/plex:latest"));
        assert!(args.windows(2).any(|w| w == ["-v", "/srv/media:/media/media:ro"]));
        assert!(args.windows(2).any(|w| w == ["-e", "TZ=Europe/Berlin"]));
        assert!(args.windows(2).any(|w| w == ["-p", "32400:32400/tcp"]));
        assert!(args.windows(2).any(|w| w == ["--label", "homeport.app=plex"]));
    }

    #[test]
    fn test_parse_inspect() {
        let json = r#"[{
            "Id": "abc123",
            "Name": "/plex",
            "Config": {"Image": "linuxserver/plex", "Env": ["TZ=UTC", "PUID=1000"]},
            "State": {"Status": "running"},
            "HostConfig": {"PortBindings": {
                "32400/tcp": [{"HostIp": "", "HostPort": "32400"}, {"HostIp": "::", "HostPort": "32400"}],
                "1900/udp": [{"HostIp": "", "HostPort": "1900"}],
                "8080/tcp": null
            }},
            "Mounts": [
                {"Type": "bind", "Source": "/srv/media", "Destination": "/media/media", "RW": false},
                {"Type": "bind", "Source": "/data/containers/plex", "Destination": "/config", "RW": true}
            ]
        }]"#;

        let details = parse_inspect(json).unwrap();
        assert_eq!(details.name, "plex");
        assert_eq!(details.image, "linuxserver/plex");
        assert_eq!(details.state, ContainerState::Running);
        assert_eq!(details.ports.len(), 2);
        assert!(details.ports.contains(&PortBinding {
            host: 1900,
            container: 1900,
            protocol: Protocol::Udp,
        }));
        assert!(details.mounts[0].read_only);
        assert!(!details.mounts[1].read_only);
        assert_eq!(details.env.get("PUID").map(String::as_str), Some("1000"));
    }

    #[test]
    fn test_parse_ps() {
        let output = concat!(
            r#"{"ID":"1","Names":"immich_server","Image":"ghcr.io/immich-app/immich-server","State":"running","Status":"Up 2 hours"}"#,
            "\n",
            r#"{"ID":"2","Names":"old","Image":"busybox","Status":"Exited (0) 3 days ago"}"#,
            "\n"
        );
        let rows = parse_ps(output).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].state, ContainerState::Running);
        assert_eq!(rows[1].state, ContainerState::Exited);
        assert!(parse_ps("not json").is_err());
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_failure() {
        let runtime = DockerCliRuntime::new("/nonexistent/docker-binary", RuntimeTimeouts::default());
        assert!(matches!(
            runtime.ps().await,
            Err(RuntimeError::SpawnFailed { .. })
        ));
    }
}
