// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::installed_app::AppType;
use crate::domain::runtime::ContainerAction;

/// App lifecycle events.
///
/// Teardown outcomes only ever surface here and in the logs: the caller of
/// uninstall has already returned by the time they are known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AppEvent {
    AppInstalled {
        app_id: String,
        app_type: AppType,
        mounted_shares: Vec<String>,
        installed_by: String,
        installed_at: DateTime<Utc>,
    },
    ExternalAppRegistered {
        app_id: String,
        url: String,
        registered_by: String,
        registered_at: DateTime<Utc>,
    },
    AppUninstalled {
        app_id: String,
        app_type: AppType,
        uninstalled_by: String,
        uninstalled_at: DateTime<Utc>,
    },
    TeardownCompleted {
        app_id: String,
        app_type: AppType,
        duration_ms: u64,
        completed_at: DateTime<Utc>,
    },
    TeardownFailed {
        app_id: String,
        app_type: AppType,
        error: String,
        failed_at: DateTime<Utc>,
    },
    AppRebuilt {
        app_id: String,
        mounted_shares: Vec<String>,
        rebuilt_by: String,
        rebuilt_at: DateTime<Utc>,
    },
    ActionPerformed {
        app_id: String,
        action: ContainerAction,
        performed_by: String,
        performed_at: DateTime<Utc>,
    },
}

impl AppEvent {
    pub fn app_id(&self) -> &str {
        match self {
            AppEvent::AppInstalled { app_id, .. }
            | AppEvent::ExternalAppRegistered { app_id, .. }
            | AppEvent::AppUninstalled { app_id, .. }
            | AppEvent::TeardownCompleted { app_id, .. }
            | AppEvent::TeardownFailed { app_id, .. }
            | AppEvent::AppRebuilt { app_id, .. }
            | AppEvent::ActionPerformed { app_id, .. } => app_id,
        }
    }
}

/// Account and storage-access changes made by administrators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AccessEvent {
    AdminBootstrapped {
        username: String,
        created_at: DateTime<Utc>,
    },
    UserCreated {
        username: String,
        created_by: String,
        created_at: DateTime<Utc>,
    },
    UserDeleted {
        username: String,
        deleted_by: String,
        deleted_at: DateTime<Utc>,
    },
    LoginFailed {
        username: String,
        failed_at: DateTime<Utc>,
    },
    SharedFolderCreated {
        name: String,
        created_by: String,
        created_at: DateTime<Utc>,
    },
    SharedFolderDeleted {
        name: String,
        deleted_by: String,
        deleted_at: DateTime<Utc>,
    },
    AppMountChanged {
        share: String,
        app_id: String,
        allowed: bool,
        changed_by: String,
        changed_at: DateTime<Utc>,
    },
    DockerPermissionChanged {
        username: String,
        granted: bool,
        changed_by: String,
        changed_at: DateTime<Utc>,
    },
}
