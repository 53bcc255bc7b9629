// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! App Orchestrator Application Service
//!
//! Turns install/uninstall/control requests into container runtime calls:
//! - Gate: can-operate (`DockerConfig.permissions` or admin role)
//! - Sanitization of every identifier before it reaches a command or path
//! - Mount-set computation from the shared-folder allow-lists (can-mount)
//! - Registry updates only after the runtime succeeded
//!
//! Uninstall removes the registry entry before returning and leaves the
//! actual teardown to a detached task whose outcome goes to the event bus and
//! the logs only. Every operation on an app id, actions and log reads
//! included, is serialized through [`AppLocks`]; the teardown task inherits
//! the uninstall's guard.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::application::app_locks::{AppGuard, AppLocks};
use crate::application::error::{ensure_allowed, OperationError, OperationResult};
use crate::domain::compose::{host_access, inject_media_mounts, MEDIA_MANIFEST_FILE};
use crate::domain::docker_config::DockerConfig;
use crate::domain::env_file::EnvFile;
use crate::domain::events::AppEvent;
use crate::domain::installed_app::{AppType, InstalledApp};
use crate::domain::permissions::{can_operate, can_see};
use crate::domain::repository::{
    DockerConfigRepository, InstalledAppRepository, SharedFolderRepository,
};
use crate::domain::runtime::{
    BindMount, ComposeProject, ContainerAction, ContainerRuntime, ContainerSpec, ContainerState,
    LiveContainer, PortBinding, Protocol, RuntimeError, APP_LABEL,
};
use crate::domain::sanitizer::{
    sanitize, sanitize_absolute_path, sanitize_env_value, sanitize_segment,
    validate_display_name, validate_env_name, validate_port, SafeName,
};
use crate::domain::shared_folder::{MountedShare, CONTAINER_MEDIA_ROOT};
use crate::domain::stack_naming::{NamingConventionResolver, StackContainerResolver};
use crate::domain::user::Identity;
use crate::infrastructure::event_bus::EventBus;

/// Mount point of the private per-app directory.
pub const CONFIG_MOUNT: &str = "/config";
/// Subdirectory of a stack directory reserved for media bind targets.
pub const STACK_MEDIA_DIR: &str = "media";

const MAX_COMPOSE_BYTES: usize = 512 * 1024;
const MAX_URL_LEN: usize = 2048;
const MAX_LOG_TAIL: usize = 5000;

// ============================================================================
// Requests & outcomes
// ============================================================================

/// Port publication as received from a client, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortMapping {
    pub host: i64,
    pub container: i64,
    #[serde(default)]
    pub protocol: Protocol,
}

/// Extra bind mount carried over from older clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeMapping {
    /// Relative to the app's private directory; absolute paths are accepted
    /// from administrators only.
    pub host: String,
    pub container: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallContainerRequest {
    pub id: String,
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    #[serde(default)]
    pub volumes: Vec<VolumeMapping>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Host port the launcher opens; defaults to the first published port.
    #[serde(default)]
    pub web_port: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallStackRequest {
    pub id: String,
    pub name: String,
    /// docker-compose.yml content.
    pub compose: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub web_port: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalAppRequest {
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallOutcome {
    pub app: InstalledApp,
    /// Names of the shared folders mounted into the app.
    pub mounted_shares: Vec<String>,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UninstallOutcome {
    pub app: InstalledApp,
    /// Whether a background teardown was started.
    pub teardown_scheduled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub app_id: String,
    pub action: ContainerAction,
    pub containers: Vec<String>,
    pub output: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildOutcome {
    pub app_id: String,
    pub image: String,
    pub ports: Vec<PortBinding>,
    pub mounted_shares: Vec<String>,
    pub output: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppStatus {
    Running,
    Paused,
    Stopped,
    /// Registered but no live container matches.
    Missing,
    /// Link-only launcher entry.
    External,
    /// The runtime could not be queried.
    Unknown,
}

impl AppStatus {
    fn from_state(state: ContainerState) -> Self {
        match state {
            ContainerState::Running | ContainerState::Restarting => AppStatus::Running,
            ContainerState::Paused => AppStatus::Paused,
            ContainerState::Created
            | ContainerState::Exited
            | ContainerState::Dead
            | ContainerState::Removing => AppStatus::Stopped,
            ContainerState::Unknown => AppStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppView {
    #[serde(flatten)]
    pub app: InstalledApp,
    pub status: AppStatus,
    /// Live containers backing the app, most canonical first.
    pub containers: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppListing {
    pub apps: Vec<AppView>,
    /// Live containers with no registry entry; operators only.
    pub unmanaged: Vec<LiveContainer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsOutcome {
    pub app_id: String,
    pub container: String,
    pub tail: usize,
    pub output: String,
}

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    pub teardown_timeout: Duration,
    pub default_log_tail: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            teardown_timeout: Duration::from_secs(120),
            default_log_tail: 200,
        }
    }
}

/// What the background teardown has to remove.
#[derive(Debug, Clone)]
struct TeardownJob {
    app_id: SafeName,
    app_type: AppType,
    stack_dir: PathBuf,
}

// ============================================================================
// Service
// ============================================================================

pub struct AppOrchestrator {
    runtime: Arc<dyn ContainerRuntime>,
    apps: Arc<dyn InstalledAppRepository>,
    shares: Arc<dyn SharedFolderRepository>,
    docker: Arc<dyn DockerConfigRepository>,
    resolver: Arc<dyn StackContainerResolver>,
    locks: Arc<AppLocks>,
    event_bus: Arc<EventBus>,
    settings: OrchestratorSettings,
}

impl AppOrchestrator {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        apps: Arc<dyn InstalledAppRepository>,
        shares: Arc<dyn SharedFolderRepository>,
        docker: Arc<dyn DockerConfigRepository>,
        event_bus: Arc<EventBus>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            runtime,
            apps,
            shares,
            docker,
            resolver: Arc::new(NamingConventionResolver),
            locks: Arc::new(AppLocks::new()),
            event_bus,
            settings,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn StackContainerResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Current Docker settings, provided `requester` may operate the engine.
    async fn authorize(&self, requester: &Identity) -> OperationResult<DockerConfig> {
        let config = self.docker.get().await?;
        if let Err(e) = ensure_allowed(can_operate(requester, &config)) {
            warn!(user = %requester.username, "Docker operation denied");
            return Err(e);
        }
        Ok(config)
    }

    /// Exactly the shares whose allow-list names `app_id`.
    async fn authorized_shares(&self, app_id: &SafeName) -> OperationResult<Vec<MountedShare>> {
        Ok(self.shares.list_for_app(app_id.as_str()).await?)
    }

    pub async fn install_container(
        &self,
        request: InstallContainerRequest,
        requester: &Identity,
    ) -> OperationResult<InstallOutcome> {
        let config = self.authorize(requester).await?;

        let app_id = sanitize_segment(&request.id)?;
        let image = sanitize(&request.image)?;
        let name = validate_display_name(&request.name)?;
        let ports = validate_ports(&request.ports)?;
        let env = validate_env(&request.env)?;
        let private_dir = config.container_dir(&app_id);
        let extra_mounts = validate_volumes(&request.volumes, &private_dir, requester)?;
        let web_port = match request.web_port {
            Some(port) => Some(validate_port(port)?),
            None => ports.first().map(|p| p.host),
        };

        let _guard = self.locks.acquire(app_id.as_str()).await;
        info!(app_id = %app_id, image = %image, user = %requester.username, "Installing container app");

        let shares = self.authorized_shares(&app_id).await?;
        tokio::fs::create_dir_all(&private_dir).await.map_err(|e| {
            OperationError::Storage(format!("cannot create {}: {}", private_dir.display(), e))
        })?;

        let spec = build_spec(
            &app_id,
            image.clone(),
            ports,
            &private_dir,
            extra_mounts,
            &shares,
            env.clone(),
        );

        // Reinstall replaces whatever container holds the name
        match self.runtime.remove(&app_id).await {
            Ok(_) => debug!(app_id = %app_id, "Removed previous container"),
            Err(RuntimeError::NotFound(_)) => {}
            Err(e) => debug!(app_id = %app_id, error = %e, "No previous container removed"),
        }

        let container_id = self.runtime.run(&spec).await.map_err(|e| {
            error!(app_id = %app_id, error = %e, "Container creation failed");
            OperationError::from(e)
        })?;
        self.record_container_env(&config, &app_id, env).await?;

        let app = InstalledApp {
            id: app_id.to_string(),
            name,
            icon: request.icon,
            port: web_port,
            image: Some(image.into_inner()),
            app_type: AppType::Container,
            color: request.color,
            external: false,
            url: None,
            installed_at: Utc::now(),
            installed_by: requester.username.clone(),
        };
        self.apps.upsert(app.clone()).await?;

        let mounted_shares: Vec<String> = shares.iter().map(|s| s.name.clone()).collect();
        info!(app_id = %app.id, shares = ?mounted_shares, "Container app installed");
        self.event_bus.publish_app_event(AppEvent::AppInstalled {
            app_id: app.id.clone(),
            app_type: AppType::Container,
            mounted_shares: mounted_shares.clone(),
            installed_by: requester.username.clone(),
            installed_at: app.installed_at,
        });

        Ok(InstallOutcome {
            app,
            mounted_shares,
            output: container_id,
        })
    }

    pub async fn install_stack(
        &self,
        request: InstallStackRequest,
        requester: &Identity,
    ) -> OperationResult<InstallOutcome> {
        let config = self.authorize(requester).await?;

        let app_id = sanitize_segment(&request.id)?;
        let name = validate_display_name(&request.name)?;
        let env = validate_env(&request.env)?;
        let web_port = request.web_port.map(validate_port).transpose()?;
        if request.compose.trim().is_empty() {
            return Err(OperationError::validation("Compose document is empty"));
        }
        if request.compose.len() > MAX_COMPOSE_BYTES {
            return Err(OperationError::validation(format!(
                "Compose document exceeds {} bytes",
                MAX_COMPOSE_BYTES
            )));
        }

        if !requester.is_admin() {
            if let Some(access) = host_access(&request.compose)?.first() {
                warn!(app_id = %app_id, user = %requester.username, access = %access, "Stack install denied");
                return Err(OperationError::forbidden(format!(
                    "Only administrators may install stacks with host access: {}",
                    access
                )));
            }
        }

        let _guard = self.locks.acquire(app_id.as_str()).await;
        info!(app_id = %app_id, user = %requester.username, "Installing stack app");

        let shares = self.authorized_shares(&app_id).await?;
        let augmented = inject_media_mounts(
            &request.compose,
            app_id.as_str(),
            &shares,
            self.resolver.as_ref(),
        )?;

        let project = ComposeProject {
            name: app_id.clone(),
            dir: config.stack_dir(&app_id),
        };
        tokio::fs::create_dir_all(project.dir.join(STACK_MEDIA_DIR)).await?;

        let existing_env = match tokio::fs::read_to_string(project.env_file()).await {
            Ok(content) => Some(EnvFile::parse(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        let env_file = EnvFile::merge_for_reinstall(existing_env.as_ref(), env);

        let manifest = serde_json::to_vec_pretty(&augmented.manifest)
            .map_err(|e| OperationError::Storage(e.to_string()))?;
        tokio::fs::write(project.compose_file(), augmented.content.as_bytes()).await?;
        tokio::fs::write(project.env_file(), env_file.render()?).await?;
        tokio::fs::write(project.dir.join(MEDIA_MANIFEST_FILE), manifest).await?;

        let output = self.runtime.compose_up(&project).await.map_err(|e| {
            error!(app_id = %app_id, error = %e, "Compose up failed");
            OperationError::from(e)
        })?;

        let app = InstalledApp {
            id: app_id.to_string(),
            name,
            icon: request.icon,
            port: web_port,
            image: None,
            app_type: AppType::Stack,
            color: request.color,
            external: false,
            url: None,
            installed_at: Utc::now(),
            installed_by: requester.username.clone(),
        };
        self.apps.upsert(app.clone()).await?;

        let mounted_shares: Vec<String> = shares.iter().map(|s| s.name.clone()).collect();
        info!(app_id = %app.id, shares = ?mounted_shares, services = ?augmented.manifest.services, "Stack app installed");
        self.event_bus.publish_app_event(AppEvent::AppInstalled {
            app_id: app.id.clone(),
            app_type: AppType::Stack,
            mounted_shares: mounted_shares.clone(),
            installed_by: requester.username.clone(),
            installed_at: app.installed_at,
        });

        Ok(InstallOutcome {
            app,
            mounted_shares,
            output: output.combined(),
        })
    }

    /// Add a link-only launcher entry. Nothing is created on the host.
    pub async fn register_external_app(
        &self,
        request: ExternalAppRequest,
        requester: &Identity,
    ) -> OperationResult<InstalledApp> {
        self.authorize(requester).await?;
        let app_id = sanitize_segment(&request.id)?;
        let name = validate_display_name(&request.name)?;
        let url = validate_url(&request.url)?;

        let _guard = self.locks.acquire(app_id.as_str()).await;
        let app = InstalledApp {
            id: app_id.to_string(),
            name,
            icon: request.icon,
            port: None,
            image: None,
            app_type: AppType::Container,
            color: request.color,
            external: true,
            url: Some(url.clone()),
            installed_at: Utc::now(),
            installed_by: requester.username.clone(),
        };
        self.apps.upsert(app.clone()).await?;

        info!(app_id = %app.id, url = %url, "External app registered");
        self.event_bus.publish_app_event(AppEvent::ExternalAppRegistered {
            app_id: app.id.clone(),
            url,
            registered_by: requester.username.clone(),
            registered_at: app.installed_at,
        });
        Ok(app)
    }

    /// Drop the registry entry now and tear the app down in the background.
    pub async fn uninstall(
        &self,
        app_id: &str,
        requester: &Identity,
    ) -> OperationResult<UninstallOutcome> {
        let config = self.authorize(requester).await?;
        let app_id = sanitize_segment(app_id)?;

        let guard = self.locks.acquire(app_id.as_str()).await;
        let app = self
            .apps
            .remove(app_id.as_str())
            .await?
            .ok_or_else(|| OperationError::not_found(format!("app '{}'", app_id)))?;

        info!(app_id = %app.id, user = %requester.username, "App uninstalled from registry");
        self.event_bus.publish_app_event(AppEvent::AppUninstalled {
            app_id: app.id.clone(),
            app_type: app.app_type,
            uninstalled_by: requester.username.clone(),
            uninstalled_at: Utc::now(),
        });

        if app.is_link_only() {
            return Ok(UninstallOutcome {
                app,
                teardown_scheduled: false,
            });
        }

        let job = TeardownJob {
            stack_dir: config.stack_dir(&app_id),
            app_id,
            app_type: app.app_type,
        };
        self.spawn_teardown(job, guard);

        Ok(UninstallOutcome {
            app,
            teardown_scheduled: true,
        })
    }

    fn spawn_teardown(&self, job: TeardownJob, guard: AppGuard) -> JoinHandle<()> {
        let runtime = self.runtime.clone();
        let event_bus = self.event_bus.clone();
        let timeout = self.settings.teardown_timeout;
        tokio::spawn(run_teardown(runtime, event_bus, job, timeout, guard))
    }

    pub async fn container_action(
        &self,
        app_id: &str,
        action: ContainerAction,
        requester: &Identity,
    ) -> OperationResult<ActionOutcome> {
        self.authorize(requester).await?;
        let app_id = sanitize_segment(app_id)?;

        let _guard = self.locks.acquire(app_id.as_str()).await;
        let targets = self.target_containers(&app_id).await?;

        let mut outputs = Vec::new();
        for target in &targets {
            let output = self.runtime.control(target, action).await?;
            outputs.push(output.combined());
        }

        info!(app_id = %app_id, action = %action, containers = ?targets, "Container action performed");
        self.event_bus.publish_app_event(AppEvent::ActionPerformed {
            app_id: app_id.to_string(),
            action,
            performed_by: requester.username.clone(),
            performed_at: Utc::now(),
        });

        Ok(ActionOutcome {
            app_id: app_id.into_inner(),
            action,
            containers: targets.into_iter().map(SafeName::into_inner).collect(),
            output: outputs.join("\n"),
        })
    }

    /// Recreate a container app with the same image and ports, the
    /// environment it was installed with, and a freshly computed mount set.
    pub async fn rebuild(
        &self,
        app_id: &str,
        requester: &Identity,
    ) -> OperationResult<RebuildOutcome> {
        let config = self.authorize(requester).await?;
        let app_id = sanitize_segment(app_id)?;

        let _guard = self.locks.acquire(app_id.as_str()).await;
        let mut app = self
            .apps
            .find(app_id.as_str())
            .await?
            .ok_or_else(|| OperationError::not_found(format!("app '{}'", app_id)))?;
        if app.app_type != AppType::Container || app.is_link_only() {
            return Err(OperationError::validation(format!(
                "App '{}' is not a container app; reinstall stacks instead",
                app_id
            )));
        }

        let details = self.runtime.inspect(&app_id).await?;
        let image = sanitize(&details.image)?;
        let private_dir = config.container_dir(&app_id);
        let shares = self.authorized_shares(&app_id).await?;

        // Keep operator-supplied mounts; share and /config mounts are rebuilt
        let media_prefix = format!("{}/", CONTAINER_MEDIA_ROOT);
        let mut extra_mounts = Vec::new();
        for mount in &details.mounts {
            if mount.destination == CONFIG_MOUNT || mount.destination.starts_with(&media_prefix) {
                continue;
            }
            match sanitize_absolute_path(&mount.source) {
                Ok(host) => extra_mounts.push(BindMount {
                    host,
                    container: mount.destination.clone(),
                    read_only: mount.read_only,
                }),
                Err(e) => warn!(app_id = %app_id, error = %e, "Dropping unsafe mount on rebuild"),
            }
        }

        let env = self.recorded_container_env(&config, &app_id).await?;

        info!(app_id = %app_id, image = %image, "Rebuilding container app");
        match self.runtime.control(&app_id, ContainerAction::Stop).await {
            Ok(_) | Err(RuntimeError::NotFound(_)) => {}
            Err(e) => warn!(app_id = %app_id, error = %e, "Stop before rebuild failed"),
        }
        self.runtime.remove(&app_id).await?;

        let ports = details.ports.clone();
        let spec = build_spec(
            &app_id,
            image.clone(),
            ports.clone(),
            &private_dir,
            extra_mounts,
            &shares,
            env,
        );
        let output = self.runtime.run(&spec).await?;

        app.image = Some(image.to_string());
        self.apps.upsert(app).await?;

        let mounted_shares: Vec<String> = shares.iter().map(|s| s.name.clone()).collect();
        self.event_bus.publish_app_event(AppEvent::AppRebuilt {
            app_id: app_id.to_string(),
            mounted_shares: mounted_shares.clone(),
            rebuilt_by: requester.username.clone(),
            rebuilt_at: Utc::now(),
        });

        Ok(RebuildOutcome {
            app_id: app_id.into_inner(),
            image: image.into_inner(),
            ports,
            mounted_shares,
            output,
        })
    }

    /// Registry entries visible to `requester`, with live status. Drift is
    /// reported, never corrected.
    pub async fn list(&self, requester: &Identity) -> OperationResult<AppListing> {
        let config = self.docker.get().await?;
        let registry = self.apps.all().await?;

        let (live, runtime_error) = match self.runtime.ps().await {
            Ok(live) => (Some(live), None),
            Err(e) => {
                warn!(error = %e, "Could not list live containers");
                (None, Some(e.to_string()))
            }
        };

        let mut claimed: BTreeSet<String> = BTreeSet::new();
        let mut apps = Vec::new();
        for app in registry {
            let matched = match &live {
                Some(live) => self.match_containers(&app, live),
                None => Vec::new(),
            };
            claimed.extend(matched.iter().map(|c| c.name.clone()));

            if !can_see(requester, &config, &app.id).is_allowed() {
                continue;
            }

            let status = if app.is_link_only() {
                AppStatus::External
            } else if live.is_none() {
                AppStatus::Unknown
            } else {
                matched
                    .first()
                    .map(|c| AppStatus::from_state(c.state))
                    .unwrap_or(AppStatus::Missing)
            };
            apps.push(AppView {
                containers: matched.iter().map(|c| c.name.clone()).collect(),
                app,
                status,
            });
        }
        apps.sort_by(|a, b| a.app.name.to_lowercase().cmp(&b.app.name.to_lowercase()));

        let unmanaged = if can_operate(requester, &config).is_allowed() {
            live.unwrap_or_default()
                .into_iter()
                .filter(|c| !claimed.contains(&c.name))
                .collect()
        } else {
            Vec::new()
        };

        Ok(AppListing {
            apps,
            unmanaged,
            runtime_error,
        })
    }

    pub async fn logs(
        &self,
        app_id: &str,
        tail: Option<usize>,
        requester: &Identity,
    ) -> OperationResult<LogsOutcome> {
        self.authorize(requester).await?;
        let app_id = sanitize_segment(app_id)?;
        let tail = tail
            .unwrap_or(self.settings.default_log_tail)
            .clamp(1, MAX_LOG_TAIL);

        let _guard = self.locks.acquire(app_id.as_str()).await;
        let target = self
            .target_containers(&app_id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OperationError::not_found(format!("container for '{}'", app_id)))?;
        let output = self.runtime.logs(&target, tail).await?;

        Ok(LogsOutcome {
            app_id: app_id.into_inner(),
            container: target.into_inner(),
            tail,
            output: output.combined(),
        })
    }

    /// Remember the environment a container app was installed with; rebuild
    /// replays exactly this, never the inspected env with its image defaults.
    async fn record_container_env(
        &self,
        config: &DockerConfig,
        app_id: &SafeName,
        env: BTreeMap<String, String>,
    ) -> OperationResult<()> {
        let path = config.container_env_file(app_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, EnvFile::from_entries(env).render()?).await?;
        Ok(())
    }

    async fn recorded_container_env(
        &self,
        config: &DockerConfig,
        app_id: &SafeName,
    ) -> OperationResult<BTreeMap<String, String>> {
        match tokio::fs::read_to_string(config.container_env_file(app_id)).await {
            Ok(content) => Ok(EnvFile::parse(&content).entries().clone()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(app_id = %app_id, "No recorded environment; rebuilding with image defaults only");
                Ok(BTreeMap::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn match_containers<'a>(&self, app: &InstalledApp, live: &'a [LiveContainer]) -> Vec<&'a LiveContainer> {
        if app.is_link_only() {
            return Vec::new();
        }
        match app.app_type {
            AppType::Container => live
                .iter()
                .filter(|c| c.name.trim_start_matches('/') == app.id)
                .collect(),
            AppType::Stack => self.resolver.resolve(&app.id, live),
        }
    }

    /// Containers an action on `app_id` applies to. Stacks resolve to their
    /// live containers; anything else is addressed by its own name.
    async fn target_containers(&self, app_id: &SafeName) -> OperationResult<Vec<SafeName>> {
        let app = self.apps.find(app_id.as_str()).await?;
        match app {
            Some(app) if app.is_link_only() => Err(OperationError::validation(format!(
                "App '{}' is an external link",
                app_id
            ))),
            Some(app) if app.app_type == AppType::Stack => {
                let live = self.runtime.ps().await?;
                let targets = self
                    .resolver
                    .resolve(app_id.as_str(), &live)
                    .into_iter()
                    .filter_map(|c| sanitize(&c.name).ok())
                    .collect::<Vec<_>>();
                if targets.is_empty() {
                    return Err(OperationError::not_found(format!(
                        "no running containers for stack '{}'",
                        app_id
                    )));
                }
                Ok(targets)
            }
            _ => Ok(vec![app_id.clone()]),
        }
    }
}

async fn run_teardown(
    runtime: Arc<dyn ContainerRuntime>,
    event_bus: Arc<EventBus>,
    job: TeardownJob,
    timeout: Duration,
    _guard: AppGuard,
) {
    let started = Instant::now();
    debug!(app_id = %job.app_id, "Teardown started");

    let result = match tokio::time::timeout(timeout, teardown(runtime.as_ref(), &job)).await {
        Ok(result) => result,
        Err(_) => Err(format!("teardown timed out after {}s", timeout.as_secs())),
    };

    match result {
        Ok(()) => {
            let duration_ms = started.elapsed().as_millis() as u64;
            info!(app_id = %job.app_id, duration_ms, "Teardown completed");
            event_bus.publish_app_event(AppEvent::TeardownCompleted {
                app_id: job.app_id.to_string(),
                app_type: job.app_type,
                duration_ms,
                completed_at: Utc::now(),
            });
        }
        Err(message) => {
            error!(app_id = %job.app_id, error = %message, "Teardown failed");
            event_bus.publish_app_event(AppEvent::TeardownFailed {
                app_id: job.app_id.to_string(),
                app_type: job.app_type,
                error: message,
                failed_at: Utc::now(),
            });
        }
    }
}

async fn teardown(runtime: &dyn ContainerRuntime, job: &TeardownJob) -> Result<(), String> {
    match job.app_type {
        AppType::Container => {
            match runtime.control(&job.app_id, ContainerAction::Stop).await {
                Ok(_) | Err(RuntimeError::NotFound(_)) => {}
                Err(e) => warn!(app_id = %job.app_id, error = %e, "Stop failed, forcing removal"),
            }
            match runtime.remove(&job.app_id).await {
                Ok(_) | Err(RuntimeError::NotFound(_)) => Ok(()),
                Err(e) => Err(describe_runtime_error(&e)),
            }
        }
        AppType::Stack => {
            let project = ComposeProject {
                name: job.app_id.clone(),
                dir: job.stack_dir.clone(),
            };
            if tokio::fs::try_exists(project.compose_file())
                .await
                .unwrap_or(false)
            {
                runtime
                    .compose_down(&project)
                    .await
                    .map_err(|e| describe_runtime_error(&e))?;
            }
            remove_dir_if_present(&job.stack_dir).await
        }
    }
}

fn describe_runtime_error(err: &RuntimeError) -> String {
    match err.output() {
        Some(output) if !output.is_empty() => format!("{}: {}", err, output),
        _ => err.to_string(),
    }
}

async fn remove_dir_if_present(dir: &Path) -> Result<(), String> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(format!("cannot remove {}: {}", dir.display(), e)),
    }
}

// ============================================================================
// Validation helpers
// ============================================================================

fn validate_ports(ports: &[PortMapping]) -> OperationResult<Vec<PortBinding>> {
    ports
        .iter()
        .map(|p| {
            Ok(PortBinding {
                host: validate_port(p.host)?,
                container: validate_port(p.container)?,
                protocol: p.protocol,
            })
        })
        .collect()
}

fn validate_env(env: &BTreeMap<String, String>) -> OperationResult<BTreeMap<String, String>> {
    env.iter()
        .map(|(key, value)| {
            validate_env_name(key)?;
            Ok((key.clone(), sanitize_env_value(value)))
        })
        .collect()
}

fn validate_volumes(
    volumes: &[VolumeMapping],
    private_dir: &Path,
    requester: &Identity,
) -> OperationResult<Vec<BindMount>> {
    let media_prefix = format!("{}/", CONTAINER_MEDIA_ROOT);
    volumes
        .iter()
        .map(|volume| {
            let container = sanitize(&volume.container)?.into_inner();
            if !container.starts_with('/') {
                return Err(OperationError::validation(format!(
                    "Container path must be absolute: {}",
                    container
                )));
            }
            if container == CONFIG_MOUNT
                || container == CONTAINER_MEDIA_ROOT
                || container.starts_with(&media_prefix)
            {
                return Err(OperationError::validation(format!(
                    "Container path {} is reserved",
                    container
                )));
            }

            let host = sanitize(&volume.host)?;
            let host = if host.as_str().starts_with('/') {
                if !requester.is_admin() {
                    return Err(OperationError::forbidden(
                        "Only administrators may bind absolute host paths",
                    ));
                }
                sanitize_absolute_path(Path::new(host.as_str()))?
            } else {
                private_dir.join(host.as_str())
            };

            Ok(BindMount {
                host,
                container,
                read_only: volume.read_only,
            })
        })
        .collect()
}

fn validate_url(url: &str) -> OperationResult<String> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(OperationError::validation("URL must start with http:// or https://"));
    }
    if url.len() > MAX_URL_LEN || url.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(OperationError::validation("URL is malformed"));
    }
    Ok(url.to_string())
}

fn build_spec(
    app_id: &SafeName,
    image: SafeName,
    ports: Vec<PortBinding>,
    private_dir: &Path,
    extra_mounts: Vec<BindMount>,
    shares: &[MountedShare],
    env: BTreeMap<String, String>,
) -> ContainerSpec {
    let mut mounts = vec![BindMount {
        host: private_dir.to_path_buf(),
        container: CONFIG_MOUNT.to_string(),
        read_only: false,
    }];
    mounts.extend(extra_mounts);
    mounts.extend(shares.iter().map(|share| BindMount {
        host: share.host_path.clone(),
        container: share.container_path(),
        read_only: true,
    }));

    ContainerSpec {
        name: app_id.clone(),
        image,
        ports,
        mounts,
        env,
        labels: BTreeMap::from([(APP_LABEL.to_string(), app_id.to_string())]),
    }
}
