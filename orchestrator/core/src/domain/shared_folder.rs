// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Shared Folder Aggregate
//!
//! A shared folder is a host directory exposed to users (with `rw`/`ro`
//! access) and, independently, to installed applications as a read-only
//! mount. The per-app allow-list is the only way a container gains
//! filesystem access beyond its private `/config` directory.
//!
//! Deleting a shared folder removes the record only; the directory and its
//! contents are never touched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::domain::sanitizer::{
    sanitize_absolute_path, sanitize_segment, validate_display_name, SafeName, SanitizeError,
};

/// Mount point prefix inside containers for authorized shares.
pub const CONTAINER_MEDIA_ROOT: &str = "/media";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FolderAccess {
    #[serde(rename = "rw")]
    ReadWrite,
    #[serde(rename = "ro")]
    ReadOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedFolder {
    pub name: String,
    pub display_name: String,
    pub path: PathBuf,
    /// username -> access level
    #[serde(default)]
    pub permissions: BTreeMap<String, FolderAccess>,
    /// app ids allowed to mount this folder
    #[serde(default)]
    pub app_permissions: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

impl SharedFolder {
    /// Build a new folder record. The name must be a single safe path
    /// segment, and the path must be absolute and sanitizer-clean.
    pub fn new(name: &str, display_name: &str, path: &Path) -> Result<Self, SanitizeError> {
        let name = sanitize_segment(name)?;
        let display_name = validate_display_name(display_name)?;
        let path = sanitize_absolute_path(path)?;

        Ok(Self {
            name: name.into_inner(),
            display_name,
            path,
            permissions: BTreeMap::new(),
            app_permissions: BTreeSet::new(),
            created_at: Utc::now(),
        })
    }

    pub fn allows_app(&self, app_id: &str) -> bool {
        self.app_permissions.contains(app_id)
    }

    pub fn access_for(&self, username: &str) -> Option<FolderAccess> {
        self.permissions.get(username).copied()
    }

    /// Set or clear a user's access. `None` removes the entry.
    pub fn set_user_access(&mut self, username: &str, access: Option<FolderAccess>) {
        match access {
            Some(level) => {
                self.permissions.insert(username.to_string(), level);
            }
            None => {
                self.permissions.remove(username);
            }
        }
    }

    /// Returns `true` when the allow-list actually changed.
    pub fn set_app_access(&mut self, app_id: &SafeName, allowed: bool) -> bool {
        if allowed {
            self.app_permissions.insert(app_id.to_string())
        } else {
            self.app_permissions.remove(app_id.as_str())
        }
    }

    pub fn mount(&self) -> MountedShare {
        MountedShare {
            name: self.name.clone(),
            host_path: self.path.clone(),
        }
    }
}

/// A share as seen by the engine when building mounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountedShare {
    pub name: String,
    pub host_path: PathBuf,
}

impl MountedShare {
    pub fn container_path(&self) -> String {
        format!("{}/{}", CONTAINER_MEDIA_ROOT, self.name)
    }

    /// `host:container:ro` bind specification.
    pub fn bind_spec(&self) -> String {
        format!("{}:{}:ro", self.host_path.display(), self.container_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sanitizer::sanitize;

    #[test]
    fn test_new_folder_validates_inputs() {
        let folder = SharedFolder::new("media", "Media Library", Path::new("/srv/media")).unwrap();
        assert_eq!(folder.name, "media");
        assert!(folder.app_permissions.is_empty());

        assert!(SharedFolder::new("../media", "Media", Path::new("/srv/media")).is_err());
        assert!(SharedFolder::new("media/x", "Media", Path::new("/srv/media")).is_err());
        assert!(SharedFolder::new("media", "Media", Path::new("relative/media")).is_err());
        assert!(SharedFolder::new("media", "Media", Path::new("/srv/../etc")).is_err());
    }

    #[test]
    fn test_app_allow_list() {
        let mut folder = SharedFolder::new("media", "Media", Path::new("/srv/media")).unwrap();
        let plex = sanitize("plex").unwrap();
        assert!(folder.set_app_access(&plex, true));
        assert!(!folder.set_app_access(&plex, true));
        assert!(folder.allows_app("plex"));
        assert!(!folder.allows_app("jellyfin"));
        assert!(folder.set_app_access(&plex, false));
        assert!(!folder.allows_app("plex"));
    }

    #[test]
    fn test_bind_spec_is_read_only() {
        let share = MountedShare {
            name: "media".to_string(),
            host_path: PathBuf::from("/srv/media"),
        };
        assert_eq!(share.bind_spec(), "/srv/media:/media/media:ro");
    }

    #[test]
    fn test_access_serialization() {
        let json = serde_json::to_string(&FolderAccess::ReadOnly).unwrap();
        assert_eq!(json, "\"ro\"");
    }
}
