// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for each aggregate, following the Repository
//! pattern: interface defined in the domain layer, implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Document |
//! |-------|-----------|----------|
//! | `UserRepository` | `User` | `users.json` |
//! | `SessionRepository` | `Session` snapshot | `sessions.json` |
//! | `SharedFolderRepository` | `SharedFolder` | `shares.json` |
//! | `DockerConfigRepository` | `DockerConfig` singleton | `docker.json` |
//! | `InstalledAppRepository` | `InstalledApp` | `apps.json` |
//!
//! Mutations that depend on the current value go through `update`, which
//! applies the closure under the document's lock. Read-modify-write through
//! separate `get`/`set` calls is last-write-wins.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::docker_config::DockerConfig;
use crate::domain::installed_app::InstalledApp;
use crate::domain::permissions::can_mount;
use crate::domain::session::Session;
use crate::domain::shared_folder::{MountedShare, SharedFolder};
use crate::domain::user::User;

/// Closure applied to a document under its write lock.
pub type DocumentUpdate<T, R> = Box<dyn FnOnce(&mut T) -> R + Send>;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(String),
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find(&self, username: &str) -> Result<Option<User>, RepositoryError>;

    /// Fails with `AlreadyExists` when the username is taken.
    async fn create(&self, user: User) -> Result<(), RepositoryError>;

    /// Fails with `NotFound` when the user does not exist.
    async fn save(&self, user: User) -> Result<(), RepositoryError>;

    async fn delete(&self, username: &str) -> Result<Option<User>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<User>, RepositoryError>;

    async fn count(&self) -> Result<usize, RepositoryError>;
}

/// Snapshot store for the in-process session table.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn load_all(&self) -> Result<Vec<Session>, RepositoryError>;

    async fn replace_all(&self, sessions: Vec<Session>) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SharedFolderRepository: Send + Sync {
    async fn all(&self) -> Result<Vec<SharedFolder>, RepositoryError>;

    async fn find(&self, name: &str) -> Result<Option<SharedFolder>, RepositoryError>;

    /// Fails with `AlreadyExists` when the name is taken.
    async fn create(&self, folder: SharedFolder) -> Result<(), RepositoryError>;

    async fn upsert(&self, folder: SharedFolder) -> Result<(), RepositoryError>;

    /// Apply `f` to the named folder; `NotFound` if it does not exist.
    async fn update(
        &self,
        name: &str,
        f: DocumentUpdate<SharedFolder, ()>,
    ) -> Result<SharedFolder, RepositoryError>;

    async fn remove(&self, name: &str) -> Result<Option<SharedFolder>, RepositoryError>;

    /// Exactly the folders whose app allow-list contains `app_id`.
    async fn list_for_app(&self, app_id: &str) -> Result<Vec<MountedShare>, RepositoryError> {
        let mut shares: Vec<MountedShare> = self
            .all()
            .await?
            .into_iter()
            .filter(|folder| can_mount(folder, app_id).is_allowed())
            .map(|folder| folder.mount())
            .collect();
        shares.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(shares)
    }
}

#[async_trait]
pub trait DockerConfigRepository: Send + Sync {
    async fn get(&self) -> Result<DockerConfig, RepositoryError>;

    async fn set(&self, config: DockerConfig) -> Result<(), RepositoryError>;

    async fn update(
        &self,
        f: DocumentUpdate<DockerConfig, ()>,
    ) -> Result<DockerConfig, RepositoryError>;
}

#[async_trait]
pub trait InstalledAppRepository: Send + Sync {
    /// Insert or overwrite the entry with the same id.
    async fn upsert(&self, app: InstalledApp) -> Result<(), RepositoryError>;

    async fn remove(&self, id: &str) -> Result<Option<InstalledApp>, RepositoryError>;

    async fn find(&self, id: &str) -> Result<Option<InstalledApp>, RepositoryError>;

    async fn all(&self) -> Result<Vec<InstalledApp>, RepositoryError>;
}
