// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Permission mediation.
//!
//! Three orthogonal checks:
//!
//! | Check | Question | Source |
//! |-------|----------|--------|
//! | can-operate | may this user install/remove/control apps at all? | `DockerConfig.permissions` |
//! | can-see | may this user see app X in the launcher? | `DockerConfig.app_permissions[X]` |
//! | can-mount | may app X mount share S? | `SharedFolder.app_permissions` |
//!
//! Admins pass the first two unconditionally. Nobody bypasses can-mount:
//! being an admin says nothing about what an app may read.

use crate::domain::docker_config::DockerConfig;
use crate::domain::shared_folder::SharedFolder;
use crate::domain::user::Identity;

/// Result of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    Deny(String),
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyDecision::Allow)
    }
}

pub fn can_operate(identity: &Identity, config: &DockerConfig) -> PolicyDecision {
    if identity.is_admin() || config.permissions.contains(&identity.username) {
        PolicyDecision::Allow
    } else {
        PolicyDecision::Deny(format!(
            "User '{}' does not have Docker permission",
            identity.username
        ))
    }
}

pub fn can_see(identity: &Identity, config: &DockerConfig, app_id: &str) -> PolicyDecision {
    if identity.is_admin() {
        return PolicyDecision::Allow;
    }
    match config.visible_users(app_id) {
        Some(users) if users.contains(&identity.username) => PolicyDecision::Allow,
        _ => PolicyDecision::Deny(format!(
            "User '{}' may not see app '{}'",
            identity.username, app_id
        )),
    }
}

pub fn can_mount(folder: &SharedFolder, app_id: &str) -> PolicyDecision {
    if folder.allows_app(app_id) {
        PolicyDecision::Allow
    } else {
        PolicyDecision::Deny(format!(
            "App '{}' may not mount share '{}'",
            app_id, folder.name
        ))
    }
}
