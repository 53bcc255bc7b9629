// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon mode implementation
//!
//! Handles:
//! - Service wiring from the loaded configuration
//! - HTTP health checks
//! - Graceful shutdown

use anyhow::Result;
use std::time::Duration;

pub mod server;

pub use server::{build_api_state, start_daemon};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonStatus {
    Running {
        version: Option<String>,
        uptime_seconds: Option<u64>,
    },
    Stopped,
    Unhealthy {
        error: String,
    },
}

/// Probe `{base_url}/health`. Connection failures mean the daemon is not
/// running; any other HTTP answer than 2xx means it is unhealthy.
pub async fn check_daemon_running(base_url: &str) -> Result<DaemonStatus> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(1500))
        .build()?;

    let health_url = format!("{}/health", base_url.trim_end_matches('/'));

    match client.get(&health_url).send().await {
        Ok(resp) if resp.status().is_success() => {
            let body = resp.json::<serde_json::Value>().await.ok();
            Ok(DaemonStatus::Running {
                version: body
                    .as_ref()
                    .and_then(|v| v["version"].as_str())
                    .map(str::to_string),
                uptime_seconds: body.as_ref().and_then(|v| v["uptime_seconds"].as_u64()),
            })
        }
        Ok(resp) => Ok(DaemonStatus::Unhealthy {
            error: format!("HTTP {}", resp.status()),
        }),
        Err(e) if e.is_connect() => Ok(DaemonStatus::Stopped),
        Err(e) => Ok(DaemonStatus::Unhealthy {
            error: e.to_string(),
        }),
    }
}
