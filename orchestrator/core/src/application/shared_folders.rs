// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared-folder management.
//!
//! Administrators define folders and decide who may use them. App mount
//! grants only take effect the next time the app is installed or rebuilt;
//! running containers keep the mounts they were created with.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::application::auth::require_admin;
use crate::application::error::{OperationError, OperationResult};
use crate::domain::events::AccessEvent;
use crate::domain::repository::SharedFolderRepository;
use crate::domain::sanitizer::sanitize_segment;
use crate::domain::shared_folder::{FolderAccess, SharedFolder};
use crate::domain::user::{validate_username, Identity};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSharedFolder {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Defaults to `{shares_root}/{name}`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

pub struct SharedFolderService {
    shares: Arc<dyn SharedFolderRepository>,
    shares_root: PathBuf,
    event_bus: Arc<EventBus>,
}

impl SharedFolderService {
    pub fn new(
        shares: Arc<dyn SharedFolderRepository>,
        shares_root: PathBuf,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            shares,
            shares_root,
            event_bus,
        }
    }

    /// Record the folder and create its directory.
    pub async fn create(
        &self,
        requester: &Identity,
        request: CreateSharedFolder,
    ) -> OperationResult<SharedFolder> {
        require_admin(requester)?;
        let name = sanitize_segment(&request.name)?;
        let path = request
            .path
            .unwrap_or_else(|| self.shares_root.join(name.as_str()));
        let display_name = request.display_name.unwrap_or_else(|| name.to_string());
        let folder = SharedFolder::new(name.as_str(), &display_name, &path)?;

        if self.shares.find(&folder.name).await?.is_some() {
            return Err(OperationError::Conflict(format!(
                "shared folder '{}' already exists",
                folder.name
            )));
        }

        tokio::fs::create_dir_all(&folder.path).await.map_err(|e| {
            OperationError::Storage(format!("cannot create {}: {}", folder.path.display(), e))
        })?;
        self.shares.create(folder.clone()).await?;

        info!(share = %folder.name, path = %folder.path.display(), by = %requester.username, "Shared folder created");
        self.event_bus.publish_access_event(AccessEvent::SharedFolderCreated {
            name: folder.name.clone(),
            created_by: requester.username.clone(),
            created_at: folder.created_at,
        });
        Ok(folder)
    }

    /// Remove the record. The directory and its data stay on disk.
    pub async fn delete(&self, requester: &Identity, name: &str) -> OperationResult<SharedFolder> {
        require_admin(requester)?;
        let removed = self
            .shares
            .remove(name)
            .await?
            .ok_or_else(|| OperationError::not_found(format!("shared folder '{}'", name)))?;

        info!(share = %removed.name, by = %requester.username, "Shared folder deleted (data kept)");
        self.event_bus.publish_access_event(AccessEvent::SharedFolderDeleted {
            name: removed.name.clone(),
            deleted_by: requester.username.clone(),
            deleted_at: Utc::now(),
        });
        Ok(removed)
    }

    /// Grant `access` to `username`, or revoke it with `None`.
    pub async fn set_user_access(
        &self,
        requester: &Identity,
        name: &str,
        username: &str,
        access: Option<FolderAccess>,
    ) -> OperationResult<SharedFolder> {
        require_admin(requester)?;
        let username = validate_username(username)?;
        let folder = self
            .shares
            .update(
                name,
                Box::new(move |folder: &mut SharedFolder| folder.set_user_access(&username, access)),
            )
            .await?;
        info!(share = %folder.name, access = ?access, "User access updated");
        Ok(folder)
    }

    /// Allow or forbid `app_id` to mount the folder.
    pub async fn set_app_access(
        &self,
        requester: &Identity,
        name: &str,
        app_id: &str,
        allowed: bool,
    ) -> OperationResult<SharedFolder> {
        require_admin(requester)?;
        let app_id = sanitize_segment(app_id)?;
        let event_app_id = app_id.to_string();
        let folder = self
            .shares
            .update(
                name,
                Box::new(move |folder: &mut SharedFolder| {
                    folder.set_app_access(&app_id, allowed);
                }),
            )
            .await?;

        info!(share = %folder.name, app_id = %event_app_id, allowed, "App mount permission updated");
        self.event_bus.publish_access_event(AccessEvent::AppMountChanged {
            share: folder.name.clone(),
            app_id: event_app_id,
            allowed,
            changed_by: requester.username.clone(),
            changed_at: Utc::now(),
        });
        Ok(folder)
    }

    /// Admins see every folder. Other users see the folders they have access
    /// to, with the permission map reduced to their own entry.
    pub async fn list(&self, requester: &Identity) -> OperationResult<Vec<SharedFolder>> {
        let mut folders = self.shares.all().await?;
        if !requester.is_admin() {
            folders.retain(|f| f.access_for(&requester.username).is_some());
            for folder in &mut folders {
                folder.permissions.retain(|user, _| user == &requester.username);
                folder.app_permissions.clear();
            }
        }
        folders.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(folders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::user::Role;
    use crate::infrastructure::repositories::JsonSharedFolderRepository;

    fn service(root: PathBuf) -> (SharedFolderService, Arc<JsonSharedFolderRepository>) {
        let repo = Arc::new(JsonSharedFolderRepository::in_memory());
        let service = SharedFolderService::new(repo.clone(), root, Arc::new(EventBus::new(16)));
        (service, repo)
    }

    fn admin() -> Identity {
        Identity::new("admin", Role::Admin)
    }

    fn create(name: &str) -> CreateSharedFolder {
        CreateSharedFolder {
            name: name.to_string(),
            display_name: None,
            path: None,
        }
    }

    #[tokio::test]
    async fn test_create_makes_directory_and_delete_keeps_it() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path().to_path_buf());

        let folder = service.create(&admin(), create("media")).await.unwrap();
        assert_eq!(folder.path, dir.path().join("media"));
        assert!(folder.path.is_dir());

        assert!(matches!(
            service.create(&admin(), create("media")).await,
            Err(OperationError::Conflict(_))
        ));

        service.delete(&admin(), "media").await.unwrap();
        assert!(dir.path().join("media").is_dir());
        assert!(matches!(
            service.delete(&admin(), "media").await,
            Err(OperationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_bad_names_and_non_admins() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path().to_path_buf());

        assert!(matches!(
            service.create(&admin(), create("../etc")).await,
            Err(OperationError::Validation(_))
        ));
        assert!(matches!(
            service.create(&admin(), create("a/b")).await,
            Err(OperationError::Validation(_))
        ));
        assert!(matches!(
            service
                .create(&Identity::new("alice", Role::User), create("media"))
                .await,
            Err(OperationError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_app_access_drives_mount_set() {
        let dir = tempfile::tempdir().unwrap();
        let (service, repo) = service(dir.path().to_path_buf());
        service.create(&admin(), create("media")).await.unwrap();

        service
            .set_app_access(&admin(), "media", "plex", true)
            .await
            .unwrap();
        assert_eq!(repo.list_for_app("plex").await.unwrap().len(), 1);

        service
            .set_app_access(&admin(), "media", "plex", false)
            .await
            .unwrap();
        assert!(repo.list_for_app("plex").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_users_only_see_their_folders() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path().to_path_buf());
        service.create(&admin(), create("media")).await.unwrap();
        service.create(&admin(), create("private")).await.unwrap();
        service
            .set_user_access(&admin(), "media", "Alice", Some(FolderAccess::ReadOnly))
            .await
            .unwrap();
        service
            .set_user_access(&admin(), "media", "bob", Some(FolderAccess::ReadWrite))
            .await
            .unwrap();

        let alice = Identity::new("alice", Role::User);
        let visible = service.list(&alice).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].permissions.len(), 1);
        assert_eq!(visible[0].access_for("alice"), Some(FolderAccess::ReadOnly));

        assert_eq!(service.list(&admin()).await.unwrap().len(), 2);
    }
}
