// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared fixtures: a recording in-process container runtime and a fully
//! wired set of services over in-memory repositories.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use homeport_core::application::auth::AuthService;
use homeport_core::application::docker_settings::DockerSettingsService;
use homeport_core::application::orchestrator::{AppOrchestrator, OrchestratorSettings};
use homeport_core::application::repository_factory::{
    create_repositories, Repositories, StorageBackend,
};
use homeport_core::application::sessions::SessionManager;
use homeport_core::application::shared_folders::{CreateSharedFolder, SharedFolderService};
use homeport_core::domain::runtime::{
    CommandOutput, ComposeProject, ContainerAction, ContainerDetails, ContainerMount,
    ContainerRuntime, ContainerSpec, ContainerState, LiveContainer, RuntimeError,
};
use homeport_core::domain::sanitizer::SafeName;
use homeport_core::domain::user::{Identity, Role};
use homeport_core::infrastructure::event_bus::EventBus;
use homeport_core::presentation::api::ApiState;

/// One call made against the runtime.
#[derive(Debug, Clone)]
pub enum Call {
    Run(ContainerSpec),
    Inspect(String),
    Control(String, ContainerAction),
    Remove(String),
    ComposeUp(String, PathBuf),
    ComposeDown(String),
    Ps,
    Logs(String, usize),
}

/// Records every call and keeps a tiny model of the host's containers.
#[derive(Default)]
pub struct RecordingRuntime {
    calls: Mutex<Vec<Call>>,
    containers: Mutex<BTreeMap<String, ContainerDetails>>,
    teardown_delay: Mutex<Option<Duration>>,
    fail_run: Mutex<Option<String>>,
    fail_ps: Mutex<bool>,
}

impl RecordingRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn runs(&self) -> Vec<ContainerSpec> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Run(spec) => Some(spec),
                _ => None,
            })
            .collect()
    }

    /// Delay applied to `remove` and `compose_down`.
    pub fn set_teardown_delay(&self, delay: Duration) {
        *self.teardown_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_next_run(&self, output: &str) {
        *self.fail_run.lock().unwrap() = Some(output.to_string());
    }

    pub fn set_ps_failing(&self, failing: bool) {
        *self.fail_ps.lock().unwrap() = failing;
    }

    /// Put a container on the host that nobody installed through us.
    pub fn add_foreign(&self, name: &str, image: &str) {
        self.insert(name, image, Vec::new(), BTreeMap::new(), Vec::new());
    }

    /// Add an env entry to a live container as if the image declared it.
    pub fn set_container_env(&self, name: &str, key: &str, value: &str) {
        if let Some(container) = self.containers.lock().unwrap().get_mut(name) {
            container.env.insert(key.to_string(), value.to_string());
        }
    }

    pub fn drop_container(&self, name: &str) {
        self.containers.lock().unwrap().remove(name);
    }

    pub fn has_container(&self, name: &str) -> bool {
        self.containers.lock().unwrap().contains_key(name)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn insert(
        &self,
        name: &str,
        image: &str,
        ports: Vec<homeport_core::domain::runtime::PortBinding>,
        env: BTreeMap<String, String>,
        mounts: Vec<ContainerMount>,
    ) {
        self.containers.lock().unwrap().insert(
            name.to_string(),
            ContainerDetails {
                id: format!("id-{}", name),
                name: name.to_string(),
                image: image.to_string(),
                state: ContainerState::Running,
                ports,
                mounts,
                env,
            },
        );
    }

    fn delay(&self) -> Option<Duration> {
        *self.teardown_delay.lock().unwrap()
    }
}

#[async_trait]
impl ContainerRuntime for RecordingRuntime {
    async fn run(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        self.record(Call::Run(spec.clone()));
        if let Some(output) = self.fail_run.lock().unwrap().take() {
            return Err(RuntimeError::CommandFailed {
                command: "docker run".to_string(),
                code: Some(125),
                output,
            });
        }

        let mut env = spec.env.clone();
        env.insert("PATH".to_string(), "/usr/bin".to_string());
        let mounts = spec
            .mounts
            .iter()
            .map(|m| ContainerMount {
                source: m.host.clone(),
                destination: m.container.clone(),
                read_only: m.read_only,
            })
            .collect();
        self.insert(
            spec.name.as_str(),
            spec.image.as_str(),
            spec.ports.clone(),
            env,
            mounts,
        );
        Ok(format!("id-{}", spec.name))
    }

    async fn inspect(&self, name: &SafeName) -> Result<ContainerDetails, RuntimeError> {
        self.record(Call::Inspect(name.to_string()));
        self.containers
            .lock()
            .unwrap()
            .get(name.as_str())
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))
    }

    async fn control(
        &self,
        name: &SafeName,
        action: ContainerAction,
    ) -> Result<CommandOutput, RuntimeError> {
        self.record(Call::Control(name.to_string(), action));
        let mut containers = self.containers.lock().unwrap();
        let container = containers
            .get_mut(name.as_str())
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;
        container.state = match action {
            ContainerAction::Start | ContainerAction::Restart | ContainerAction::Unpause => {
                ContainerState::Running
            }
            ContainerAction::Stop => ContainerState::Exited,
            ContainerAction::Pause => ContainerState::Paused,
        };
        Ok(CommandOutput {
            stdout: name.to_string(),
            stderr: String::new(),
        })
    }

    async fn remove(&self, name: &SafeName) -> Result<CommandOutput, RuntimeError> {
        self.record(Call::Remove(name.to_string()));
        if let Some(delay) = self.delay() {
            tokio::time::sleep(delay).await;
        }
        match self.containers.lock().unwrap().remove(name.as_str()) {
            Some(_) => Ok(CommandOutput {
                stdout: name.to_string(),
                stderr: String::new(),
            }),
            None => Err(RuntimeError::NotFound(name.to_string())),
        }
    }

    async fn compose_up(&self, project: &ComposeProject) -> Result<CommandOutput, RuntimeError> {
        self.record(Call::ComposeUp(project.name.to_string(), project.dir.clone()));
        let server = format!("{}_server", project.name);
        let redis = format!("{}_redis", project.name);
        self.insert(&server, "stack/server", Vec::new(), BTreeMap::new(), Vec::new());
        self.insert(&redis, "redis", Vec::new(), BTreeMap::new(), Vec::new());
        Ok(CommandOutput {
            stdout: String::new(),
            stderr: format!("Container {} Started", server),
        })
    }

    async fn compose_down(&self, project: &ComposeProject) -> Result<CommandOutput, RuntimeError> {
        self.record(Call::ComposeDown(project.name.to_string()));
        if let Some(delay) = self.delay() {
            tokio::time::sleep(delay).await;
        }
        let prefix = format!("{}_", project.name);
        self.containers
            .lock()
            .unwrap()
            .retain(|name, _| !name.starts_with(&prefix));
        Ok(CommandOutput::default())
    }

    async fn ps(&self) -> Result<Vec<LiveContainer>, RuntimeError> {
        self.record(Call::Ps);
        if *self.fail_ps.lock().unwrap() {
            return Err(RuntimeError::SpawnFailed {
                command: "docker ps".to_string(),
                message: "Cannot connect to the Docker daemon".to_string(),
            });
        }
        Ok(self
            .containers
            .lock()
            .unwrap()
            .values()
            .map(|c| LiveContainer {
                id: c.id.clone(),
                name: c.name.clone(),
                image: c.image.clone(),
                state: c.state,
                status: String::new(),
            })
            .collect())
    }

    async fn logs(&self, name: &SafeName, tail: usize) -> Result<CommandOutput, RuntimeError> {
        self.record(Call::Logs(name.to_string(), tail));
        if !self.has_container(name.as_str()) {
            return Err(RuntimeError::NotFound(name.to_string()));
        }
        Ok(CommandOutput {
            stdout: format!("{} log line", name),
            stderr: String::new(),
        })
    }
}

pub fn admin() -> Identity {
    Identity::new("admin", Role::Admin)
}

pub fn user(name: &str) -> Identity {
    Identity::new(name, Role::User)
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub runtime: Arc<RecordingRuntime>,
    pub repos: Repositories,
    pub event_bus: Arc<EventBus>,
    pub auth: Arc<AuthService>,
    pub shares: Arc<SharedFolderService>,
    pub docker: Arc<DockerSettingsService>,
    pub orchestrator: Arc<AppOrchestrator>,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repos = create_repositories(&StorageBackend::InMemory, dir.path().join("docker"))
            .await
            .unwrap();
        let runtime = Arc::new(RecordingRuntime::new());
        let event_bus = Arc::new(EventBus::new(256));

        let sessions = Arc::new(
            SessionManager::load(repos.sessions.clone(), Duration::from_secs(3600))
                .await
                .unwrap(),
        );
        let auth = Arc::new(AuthService::new(
            repos.users.clone(),
            sessions,
            event_bus.clone(),
            4,
        ));
        let shares = Arc::new(SharedFolderService::new(
            repos.shares.clone(),
            dir.path().join("shares"),
            event_bus.clone(),
        ));
        let docker = Arc::new(DockerSettingsService::new(
            repos.docker.clone(),
            event_bus.clone(),
        ));
        let orchestrator = Arc::new(AppOrchestrator::new(
            runtime.clone(),
            repos.apps.clone(),
            repos.shares.clone(),
            repos.docker.clone(),
            event_bus.clone(),
            OrchestratorSettings {
                teardown_timeout: Duration::from_secs(5),
                default_log_tail: 100,
            },
        ));

        Self {
            dir,
            runtime,
            repos,
            event_bus,
            auth,
            shares,
            docker,
            orchestrator,
        }
    }

    pub fn docker_root(&self) -> PathBuf {
        self.dir.path().join("docker")
    }

    /// Create a share and allow each of `apps` to mount it.
    pub async fn share(&self, name: &str, apps: &[&str]) {
        self.shares
            .create(
                &admin(),
                CreateSharedFolder {
                    name: name.to_string(),
                    display_name: None,
                    path: None,
                },
            )
            .await
            .unwrap();
        for app in apps {
            self.shares
                .set_app_access(&admin(), name, app, true)
                .await
                .unwrap();
        }
    }

    pub fn api_state(&self) -> Arc<ApiState> {
        Arc::new(ApiState::new(
            self.auth.clone(),
            self.shares.clone(),
            self.docker.clone(),
            self.orchestrator.clone(),
        ))
    }
}
