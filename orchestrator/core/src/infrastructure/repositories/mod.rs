// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! JSON-file implementations of the repository contracts defined in
//! `crate::domain::repository`. Every document lives under the data
//! directory and is owned by one [`JsonDocument`]:
//!
//! | Repository | File |
//! |------------|------|
//! | `JsonUserRepository` | `users.json` |
//! | `JsonSessionRepository` | `sessions.json` |
//! | `JsonSharedFolderRepository` | `shares.json` |
//! | `JsonDockerConfigRepository` | `docker.json` |
//! | `JsonInstalledAppRepository` | `apps.json` |
//!
//! Each repository also has an `in_memory` constructor backed by an
//! unpersisted document.

pub mod json_document;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::domain::docker_config::DockerConfig;
use crate::domain::installed_app::InstalledApp;
use crate::domain::repository::{
    DockerConfigRepository, DocumentUpdate, InstalledAppRepository, RepositoryError,
    SessionRepository, SharedFolderRepository, UserRepository,
};
use crate::domain::session::Session;
use crate::domain::shared_folder::SharedFolder;
use crate::domain::user::User;

pub use json_document::JsonDocument;

pub const USERS_FILE: &str = "users.json";
pub const SESSIONS_FILE: &str = "sessions.json";
pub const SHARES_FILE: &str = "shares.json";
pub const DOCKER_FILE: &str = "docker.json";
pub const APPS_FILE: &str = "apps.json";

pub struct JsonUserRepository {
    doc: JsonDocument<BTreeMap<String, User>>,
}

impl JsonUserRepository {
    pub async fn open(data_dir: &Path) -> Result<Self, RepositoryError> {
        Ok(Self {
            doc: JsonDocument::open(data_dir.join(USERS_FILE), BTreeMap::new()).await?,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            doc: JsonDocument::in_memory(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl UserRepository for JsonUserRepository {
    async fn find(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.doc.read(|users| users.get(username).cloned()).await)
    }

    async fn create(&self, user: User) -> Result<(), RepositoryError> {
        self.doc
            .update(move |users| {
                if users.contains_key(&user.username) {
                    return Err(RepositoryError::AlreadyExists(format!(
                        "user '{}'",
                        user.username
                    )));
                }
                users.insert(user.username.clone(), user);
                Ok(())
            })
            .await
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        self.doc
            .update(move |users| match users.get_mut(&user.username) {
                Some(existing) => {
                    *existing = user;
                    Ok(())
                }
                None => Err(RepositoryError::NotFound(format!("user '{}'", user.username))),
            })
            .await
    }

    async fn delete(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let username = username.to_string();
        self.doc.update(move |users| Ok(users.remove(&username))).await
    }

    async fn list_all(&self) -> Result<Vec<User>, RepositoryError> {
        Ok(self.doc.read(|users| users.values().cloned().collect()).await)
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        Ok(self.doc.read(BTreeMap::len).await)
    }
}

pub struct JsonSessionRepository {
    doc: JsonDocument<Vec<Session>>,
}

impl JsonSessionRepository {
    pub async fn open(data_dir: &Path) -> Result<Self, RepositoryError> {
        Ok(Self {
            doc: JsonDocument::open(data_dir.join(SESSIONS_FILE), Vec::new()).await?,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            doc: JsonDocument::in_memory(Vec::new()),
        }
    }
}

#[async_trait]
impl SessionRepository for JsonSessionRepository {
    async fn load_all(&self) -> Result<Vec<Session>, RepositoryError> {
        Ok(self.doc.snapshot().await)
    }

    async fn replace_all(&self, sessions: Vec<Session>) -> Result<(), RepositoryError> {
        self.doc
            .update(move |stored| {
                *stored = sessions;
                Ok(())
            })
            .await
    }
}

pub struct JsonSharedFolderRepository {
    doc: JsonDocument<BTreeMap<String, SharedFolder>>,
}

impl JsonSharedFolderRepository {
    pub async fn open(data_dir: &Path) -> Result<Self, RepositoryError> {
        Ok(Self {
            doc: JsonDocument::open(data_dir.join(SHARES_FILE), BTreeMap::new()).await?,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            doc: JsonDocument::in_memory(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl SharedFolderRepository for JsonSharedFolderRepository {
    async fn all(&self) -> Result<Vec<SharedFolder>, RepositoryError> {
        Ok(self.doc.read(|shares| shares.values().cloned().collect()).await)
    }

    async fn find(&self, name: &str) -> Result<Option<SharedFolder>, RepositoryError> {
        Ok(self.doc.read(|shares| shares.get(name).cloned()).await)
    }

    async fn create(&self, folder: SharedFolder) -> Result<(), RepositoryError> {
        self.doc
            .update(move |shares| {
                if shares.contains_key(&folder.name) {
                    return Err(RepositoryError::AlreadyExists(format!(
                        "shared folder '{}'",
                        folder.name
                    )));
                }
                shares.insert(folder.name.clone(), folder);
                Ok(())
            })
            .await
    }

    async fn upsert(&self, folder: SharedFolder) -> Result<(), RepositoryError> {
        self.doc
            .update(move |shares| {
                shares.insert(folder.name.clone(), folder);
                Ok(())
            })
            .await
    }

    async fn update(
        &self,
        name: &str,
        f: DocumentUpdate<SharedFolder, ()>,
    ) -> Result<SharedFolder, RepositoryError> {
        let name = name.to_string();
        self.doc
            .update(move |shares| match shares.get_mut(&name) {
                Some(folder) => {
                    f(folder);
                    Ok(folder.clone())
                }
                None => Err(RepositoryError::NotFound(format!("shared folder '{}'", name))),
            })
            .await
    }

    async fn remove(&self, name: &str) -> Result<Option<SharedFolder>, RepositoryError> {
        let name = name.to_string();
        self.doc.update(move |shares| Ok(shares.remove(&name))).await
    }
}

pub struct JsonDockerConfigRepository {
    doc: JsonDocument<DockerConfig>,
}

impl JsonDockerConfigRepository {
    /// `default_root` seeds the data root when `docker.json` does not exist.
    pub async fn open(data_dir: &Path, default_root: PathBuf) -> Result<Self, RepositoryError> {
        Ok(Self {
            doc: JsonDocument::open(
                data_dir.join(DOCKER_FILE),
                DockerConfig::with_root(default_root),
            )
            .await?,
        })
    }

    pub fn in_memory(config: DockerConfig) -> Self {
        Self {
            doc: JsonDocument::in_memory(config),
        }
    }
}

#[async_trait]
impl DockerConfigRepository for JsonDockerConfigRepository {
    async fn get(&self) -> Result<DockerConfig, RepositoryError> {
        Ok(self.doc.snapshot().await)
    }

    async fn set(&self, config: DockerConfig) -> Result<(), RepositoryError> {
        self.doc
            .update(move |stored| {
                *stored = config;
                Ok(())
            })
            .await
    }

    async fn update(
        &self,
        f: DocumentUpdate<DockerConfig, ()>,
    ) -> Result<DockerConfig, RepositoryError> {
        self.doc
            .update(move |config| {
                f(config);
                Ok(config.clone())
            })
            .await
    }
}

pub struct JsonInstalledAppRepository {
    doc: JsonDocument<BTreeMap<String, InstalledApp>>,
}

impl JsonInstalledAppRepository {
    pub async fn open(data_dir: &Path) -> Result<Self, RepositoryError> {
        Ok(Self {
            doc: JsonDocument::open(data_dir.join(APPS_FILE), BTreeMap::new()).await?,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            doc: JsonDocument::in_memory(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl InstalledAppRepository for JsonInstalledAppRepository {
    async fn upsert(&self, app: InstalledApp) -> Result<(), RepositoryError> {
        self.doc
            .update(move |apps| {
                apps.insert(app.id.clone(), app);
                Ok(())
            })
            .await
    }

    async fn remove(&self, id: &str) -> Result<Option<InstalledApp>, RepositoryError> {
        let id = id.to_string();
        self.doc.update(move |apps| Ok(apps.remove(&id))).await
    }

    async fn find(&self, id: &str) -> Result<Option<InstalledApp>, RepositoryError> {
        Ok(self.doc.read(|apps| apps.get(id).cloned()).await)
    }

    async fn all(&self) -> Result<Vec<InstalledApp>, RepositoryError> {
        Ok(self.doc.read(|apps| apps.values().cloned().collect()).await)
    }
}
