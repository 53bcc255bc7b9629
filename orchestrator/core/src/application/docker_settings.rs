// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Docker settings: the installed flag, data root and the two global
//! permission relations (can-operate and per-app can-see).

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::application::auth::require_admin;
use crate::application::error::OperationResult;
use crate::domain::docker_config::DockerConfig;
use crate::domain::events::AccessEvent;
use crate::domain::repository::DockerConfigRepository;
use crate::domain::sanitizer::{sanitize_absolute_path, sanitize_segment};
use crate::domain::user::{validate_username, Identity};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigureDocker {
    #[serde(default)]
    pub installed: Option<bool>,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

pub struct DockerSettingsService {
    config: Arc<dyn DockerConfigRepository>,
    event_bus: Arc<EventBus>,
}

impl DockerSettingsService {
    pub fn new(config: Arc<dyn DockerConfigRepository>, event_bus: Arc<EventBus>) -> Self {
        Self { config, event_bus }
    }

    pub async fn get(&self, requester: &Identity) -> OperationResult<DockerConfig> {
        require_admin(requester)?;
        Ok(self.config.get().await?)
    }

    /// Update the installed flag and/or data root. Existing apps keep their
    /// directories under the old root.
    pub async fn configure(
        &self,
        requester: &Identity,
        request: ConfigureDocker,
    ) -> OperationResult<DockerConfig> {
        require_admin(requester)?;
        let path = match request.path {
            Some(path) => Some(sanitize_absolute_path(&path)?),
            None => None,
        };
        if let Some(root) = &path {
            tokio::fs::create_dir_all(root).await?;
        }

        let installed = request.installed;
        let updated = self
            .config
            .update(Box::new(move |config: &mut DockerConfig| {
                if let Some(installed) = installed {
                    config.installed = installed;
                }
                if let Some(path) = path {
                    config.path = path;
                }
            }))
            .await?;
        info!(installed = updated.installed, root = %updated.path.display(), "Docker settings updated");
        Ok(updated)
    }

    /// Grant or revoke the global Docker (can-operate) permission.
    pub async fn set_user_permission(
        &self,
        requester: &Identity,
        username: &str,
        granted: bool,
    ) -> OperationResult<DockerConfig> {
        require_admin(requester)?;
        let username = validate_username(username)?;
        let target = username.clone();
        let updated = self
            .config
            .update(Box::new(move |config: &mut DockerConfig| {
                if granted {
                    config.permissions.insert(target);
                } else {
                    config.permissions.remove(&target);
                }
            }))
            .await?;

        info!(user = %username, granted, "Docker permission changed");
        self.event_bus
            .publish_access_event(AccessEvent::DockerPermissionChanged {
                username,
                granted,
                changed_by: requester.username.clone(),
                changed_at: Utc::now(),
            });
        Ok(updated)
    }

    /// Replace the set of users who may see `app_id` in the launcher. An
    /// empty list removes the entry.
    pub async fn set_app_visibility(
        &self,
        requester: &Identity,
        app_id: &str,
        usernames: Vec<String>,
    ) -> OperationResult<DockerConfig> {
        require_admin(requester)?;
        let app_id = sanitize_segment(app_id)?.into_inner();
        let users = usernames
            .iter()
            .map(|u| validate_username(u))
            .collect::<Result<BTreeSet<String>, _>>()?;

        let key = app_id.clone();
        let updated = self
            .config
            .update(Box::new(move |config: &mut DockerConfig| {
                if users.is_empty() {
                    config.app_permissions.remove(&key);
                } else {
                    config.app_permissions.insert(key, users);
                }
            }))
            .await?;
        info!(app_id = %app_id, "App visibility updated");
        Ok(updated)
    }

    /// Uninstall semantics: clear permissions and the installed flag. The
    /// record itself is never deleted.
    pub async fn reset(&self, requester: &Identity) -> OperationResult<DockerConfig> {
        require_admin(requester)?;
        let updated = self
            .config
            .update(Box::new(|config: &mut DockerConfig| config.reset()))
            .await?;
        info!("Docker settings reset");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::error::OperationError;
    use crate::domain::user::Role;
    use crate::infrastructure::repositories::JsonDockerConfigRepository;

    fn service() -> DockerSettingsService {
        DockerSettingsService::new(
            Arc::new(JsonDockerConfigRepository::in_memory(DockerConfig::with_root(
                "/data/docker",
            ))),
            Arc::new(EventBus::new(16)),
        )
    }

    #[tokio::test]
    async fn test_permissions_and_reset() {
        let service = service();
        let admin = Identity::new("admin", Role::Admin);

        service
            .set_user_permission(&admin, "Alice", true)
            .await
            .unwrap();
        let config = service
            .set_app_visibility(&admin, "plex", vec!["bob".to_string()])
            .await
            .unwrap();
        assert!(config.permissions.contains("alice"));
        assert!(config.visible_users("plex").unwrap().contains("bob"));

        let config = service
            .set_app_visibility(&admin, "plex", Vec::new())
            .await
            .unwrap();
        assert!(config.visible_users("plex").is_none());

        let config = service.reset(&admin).await.unwrap();
        assert!(config.permissions.is_empty());
        assert_eq!(config.path, PathBuf::from("/data/docker"));
    }

    #[tokio::test]
    async fn test_requires_admin_and_valid_input() {
        let service = service();
        let alice = Identity::new("alice", Role::User);
        assert!(matches!(
            service.get(&alice).await,
            Err(OperationError::Forbidden(_))
        ));

        let admin = Identity::new("admin", Role::Admin);
        assert!(matches!(
            service
                .configure(
                    &admin,
                    ConfigureDocker {
                        installed: Some(true),
                        path: Some(PathBuf::from("relative/root")),
                    }
                )
                .await,
            Err(OperationError::Validation(_))
        ));
        assert!(matches!(
            service
                .set_app_visibility(&admin, "../plex", Vec::new())
                .await,
            Err(OperationError::Validation(_))
        ));
    }
}
