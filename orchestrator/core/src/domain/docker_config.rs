// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::domain::sanitizer::SafeName;

pub const CONTAINERS_DIR: &str = "containers";
pub const STACKS_DIR: &str = "stacks";
pub const ENV_DIR: &str = "env";

/// Singleton Docker settings document.
///
/// Holds both global authorization relations: who may operate the engine at
/// all (`permissions`) and who may see each installed app in the launcher
/// (`app_permissions`). The record is never deleted; [`DockerConfig::reset`]
/// clears it instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerConfig {
    pub installed: bool,
    /// Docker data root; per-app directories live beneath it.
    pub path: PathBuf,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    /// app id -> usernames allowed to see the app
    #[serde(default)]
    pub app_permissions: BTreeMap<String, BTreeSet<String>>,
}

impl DockerConfig {
    pub fn with_root(path: impl Into<PathBuf>) -> Self {
        Self {
            installed: false,
            path: path.into(),
            permissions: BTreeSet::new(),
            app_permissions: BTreeMap::new(),
        }
    }

    /// `{root}/containers/{id}`: private `/config` volume of a container app.
    pub fn container_dir(&self, app_id: &SafeName) -> PathBuf {
        self.path.join(CONTAINERS_DIR).join(app_id.as_str())
    }

    /// `{root}/env/{id}.env`: environment a container app was installed
    /// with. Kept outside the app's `/config` mount.
    pub fn container_env_file(&self, app_id: &SafeName) -> PathBuf {
        self.path
            .join(ENV_DIR)
            .join(format!("{}.env", app_id.as_str()))
    }

    /// `{root}/stacks/{id}`: compose definition, env file and media manifest.
    pub fn stack_dir(&self, app_id: &SafeName) -> PathBuf {
        self.path.join(STACKS_DIR).join(app_id.as_str())
    }

    /// Uninstall semantics: clear every field but keep the data root so the
    /// record can be reconfigured later.
    pub fn reset(&mut self) {
        self.installed = false;
        self.permissions.clear();
        self.app_permissions.clear();
    }

    pub fn visible_users(&self, app_id: &str) -> Option<&BTreeSet<String>> {
        self.app_permissions.get(app_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sanitizer::sanitize;

    #[test]
    fn test_layout() {
        let config = DockerConfig::with_root("/var/lib/homeport/docker");
        let id = sanitize("plex").unwrap();
        assert_eq!(
            config.container_dir(&id),
            PathBuf::from("/var/lib/homeport/docker/containers/plex")
        );
        assert_eq!(
            config.stack_dir(&id),
            PathBuf::from("/var/lib/homeport/docker/stacks/plex")
        );
        assert_eq!(
            config.container_env_file(&id),
            PathBuf::from("/var/lib/homeport/docker/env/plex.env")
        );
    }

    #[test]
    fn test_reset_keeps_root() {
        let mut config = DockerConfig::with_root("/data/docker");
        config.installed = true;
        config.permissions.insert("alice".to_string());
        config
            .app_permissions
            .insert("plex".to_string(), ["alice".to_string()].into());

        config.reset();

        assert!(!config.installed);
        assert!(config.permissions.is_empty());
        assert!(config.app_permissions.is_empty());
        assert_eq!(config.path, PathBuf::from("/data/docker"));
    }
}
