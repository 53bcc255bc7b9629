// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon HTTP server implementation

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use homeport_core::{
    application::{
        auth::AuthService,
        docker_settings::DockerSettingsService,
        orchestrator::{AppOrchestrator, OrchestratorSettings},
        repository_factory::{create_repositories, StorageBackend},
        sessions::SessionManager,
        shared_folders::SharedFolderService,
    },
    domain::config::ControlPlaneConfig,
    infrastructure::{
        event_bus::{spawn_event_logger, EventBus},
        runtime::DockerCliRuntime,
    },
    presentation::api::{router, ApiState},
};

pub async fn start_daemon(config: ControlPlaneConfig) -> Result<()> {
    config
        .validate()
        .context("Configuration validation failed")?;

    info!(
        name = %config.metadata.name,
        data_dir = %config.spec.storage.data_dir.display(),
        "Homeport daemon starting"
    );

    let event_bus = Arc::new(EventBus::with_default_capacity());
    let _event_logger = spawn_event_logger(&event_bus);

    let state = build_api_state(&config, event_bus).await?;
    state
        .auth
        .sessions()
        .clone()
        .spawn_sweeper(config.spec.auth.sweep_interval);

    let app = router(state).layer(TraceLayer::new_for_http());

    let addr = format!(
        "{}:{}",
        config.spec.server.bind_address, config.spec.server.port
    );
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Daemon listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Daemon shutting down");

    Ok(())
}

/// Open the persisted state and wire every service the API needs.
pub async fn build_api_state(
    config: &ControlPlaneConfig,
    event_bus: Arc<EventBus>,
) -> Result<Arc<ApiState>> {
    let spec = &config.spec;

    let repos = create_repositories(
        &StorageBackend::Json(spec.storage.data_dir.clone()),
        spec.docker.data_root.clone(),
    )
    .await
    .context("Failed to open state directory")?;

    let runtime = Arc::new(DockerCliRuntime::new(
        spec.docker.binary.clone(),
        spec.docker.timeouts,
    ));
    match runtime.healthcheck().await {
        Ok(version) => info!(version = %version, "Container runtime reachable"),
        Err(e) => warn!(error = %e, "Container runtime unavailable; app operations will fail until it is"),
    }

    let sessions = Arc::new(
        SessionManager::load(repos.sessions.clone(), spec.auth.session_ttl)
            .await
            .context("Failed to load sessions")?,
    );
    let auth = Arc::new(AuthService::new(
        repos.users.clone(),
        sessions,
        event_bus.clone(),
        spec.auth.bcrypt_cost,
    ));
    if auth.needs_setup().await? {
        warn!("No users yet; POST /api/auth/setup to create the first administrator");
    }

    let shares = Arc::new(SharedFolderService::new(
        repos.shares.clone(),
        spec.storage.shares_root.clone(),
        event_bus.clone(),
    ));
    let docker = Arc::new(DockerSettingsService::new(
        repos.docker.clone(),
        event_bus.clone(),
    ));
    let orchestrator = Arc::new(AppOrchestrator::new(
        runtime,
        repos.apps.clone(),
        repos.shares.clone(),
        repos.docker.clone(),
        event_bus,
        OrchestratorSettings {
            teardown_timeout: spec.docker.timeouts.teardown,
            default_log_tail: spec.docker.default_log_tail,
        },
    ));

    Ok(Arc::new(ApiState::new(auth, shares, docker, orchestrator)))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_is_built_from_config_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ControlPlaneConfig::default();
        config.spec.storage.data_dir = dir.path().join("state");
        config.spec.storage.shares_root = dir.path().join("shares");
        config.spec.docker.data_root = dir.path().join("docker");
        config.spec.docker.binary = "homeport-test-missing-docker".to_string();
        config.spec.auth.bcrypt_cost = 4;

        let state = build_api_state(&config, Arc::new(EventBus::new(16)))
            .await
            .unwrap();
        assert!(state.auth.needs_setup().await.unwrap());
        assert!(dir.path().join("state").is_dir());
    }
}
