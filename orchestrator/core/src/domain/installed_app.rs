// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppType {
    Container,
    Stack,
}

/// Launcher entry for an installed application.
///
/// This is declared state: it records what an operator asked for, not what
/// Docker is currently running. It is written after a successful install and
/// removed as soon as an uninstall is requested, so it can disagree with live
/// container state for a while (or indefinitely, if a teardown fails).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledApp {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(rename = "type")]
    pub app_type: AppType,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub external: bool,
    /// Target of link-only launcher entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub installed_at: DateTime<Utc>,
    pub installed_by: String,
}

impl InstalledApp {
    /// Link-only entries have no container or stack behind them.
    pub fn is_link_only(&self) -> bool {
        self.external && self.url.is_some()
    }
}
