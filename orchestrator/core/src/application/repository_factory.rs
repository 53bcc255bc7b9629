// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory - Application Layer
//!
//! Creates concrete repository implementations based on the storage backend.
//! Services only ever see the domain traits.

use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::docker_config::DockerConfig;
use crate::domain::repository::{
    DockerConfigRepository, InstalledAppRepository, RepositoryError, SessionRepository,
    SharedFolderRepository, UserRepository,
};
use crate::infrastructure::repositories::{
    JsonDockerConfigRepository, JsonInstalledAppRepository, JsonSessionRepository,
    JsonSharedFolderRepository, JsonUserRepository,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    /// Nothing touches the disk; used by tests and dry runs.
    InMemory,
    /// One JSON document per collection under the given data directory.
    Json(PathBuf),
}

/// Every repository the services need.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub shares: Arc<dyn SharedFolderRepository>,
    pub docker: Arc<dyn DockerConfigRepository>,
    pub apps: Arc<dyn InstalledAppRepository>,
}

/// `docker_root` seeds the Docker data root the first time the store is
/// created; an existing `docker.json` wins over it.
pub async fn create_repositories(
    backend: &StorageBackend,
    docker_root: PathBuf,
) -> Result<Repositories, RepositoryError> {
    match backend {
        StorageBackend::InMemory => Ok(Repositories {
            users: Arc::new(JsonUserRepository::in_memory()),
            sessions: Arc::new(JsonSessionRepository::in_memory()),
            shares: Arc::new(JsonSharedFolderRepository::in_memory()),
            docker: Arc::new(JsonDockerConfigRepository::in_memory(
                DockerConfig::with_root(docker_root),
            )),
            apps: Arc::new(JsonInstalledAppRepository::in_memory()),
        }),
        StorageBackend::Json(data_dir) => {
            tokio::fs::create_dir_all(data_dir)
                .await
                .map_err(|e| RepositoryError::Io(format!("{}: {}", data_dir.display(), e)))?;
            Ok(Repositories {
                users: Arc::new(JsonUserRepository::open(data_dir).await?),
                sessions: Arc::new(JsonSessionRepository::open(data_dir).await?),
                shares: Arc::new(JsonSharedFolderRepository::open(data_dir).await?),
                docker: Arc::new(JsonDockerConfigRepository::open(data_dir, docker_root).await?),
                apps: Arc::new(JsonInstalledAppRepository::open(data_dir).await?),
            })
        }
    }
}
