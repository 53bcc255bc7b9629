// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod app_locks;
pub mod auth;
pub mod docker_settings;
pub mod error;
pub mod orchestrator;
pub mod repository_factory;
pub mod sessions;
pub mod shared_folders;

// Re-export services for convenience
pub use auth::{AuthService, LoginResult, UserView};
pub use docker_settings::{ConfigureDocker, DockerSettingsService};
pub use error::{OperationError, OperationResult};
pub use orchestrator::{
    AppListing, AppOrchestrator, ExternalAppRequest, InstallContainerRequest,
    InstallStackRequest, OrchestratorSettings,
};
pub use repository_factory::{create_repositories, Repositories, StorageBackend};
pub use sessions::SessionManager;
pub use shared_folders::{CreateSharedFolder, SharedFolderService};
