// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `homeport status`: probe a daemon's `/health` endpoint.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;

use crate::daemon::{check_daemon_running, DaemonStatus};
use homeport_core::domain::config::ControlPlaneConfig;

pub async fn handle_command(url: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let base_url = match url {
        Some(url) => url,
        None => {
            let config = ControlPlaneConfig::load_or_default(config_path)
                .context("Failed to load configuration")?;
            local_url(&config)
        }
    };

    match check_daemon_running(&base_url).await? {
        DaemonStatus::Running {
            version,
            uptime_seconds,
        } => {
            println!("{} {}", "●".green(), "Homeport is running".bold());
            println!("  URL: {}", base_url);
            if let Some(version) = version {
                println!("  Version: {}", version);
            }
            if let Some(uptime) = uptime_seconds {
                println!("  Uptime: {}", format_uptime(uptime));
            }
        }
        DaemonStatus::Unhealthy { error } => {
            println!("{} {}", "●".yellow(), "Homeport is unhealthy".bold());
            println!("  URL: {}", base_url);
            println!("  Error: {}", error);
        }
        DaemonStatus::Stopped => {
            println!("{} {}", "●".red(), "Homeport is not running".bold());
            println!("  URL: {}", base_url);
            std::process::exit(1);
        }
    }
    Ok(())
}

/// Loopback URL of the daemon described by `config`.
pub fn local_url(config: &ControlPlaneConfig) -> String {
    let host = match config.spec.server.bind_address.as_str() {
        "0.0.0.0" | "::" | "" => "127.0.0.1",
        other => other,
    };
    format!("http://{}:{}", host, config.spec.server.port)
}

fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3600;
    let minutes = (seconds % 3600) / 60;
    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m {}s", minutes, seconds % 60)
    }
}
