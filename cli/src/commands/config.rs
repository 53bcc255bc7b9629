// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use homeport_core::domain::config::{ControlPlaneConfig, CONFIG_PATH_ENV};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file with every default spelled out
    Generate {
        /// Output path (default: ./homeport-config.yaml)
        #[arg(short, long, default_value = "./homeport-config.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, force } => generate(&output, force).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = ControlPlaneConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./homeport-config.yaml");
        println!("  4. ~/.homeport/config.yaml");
        println!("  5. /etc/homeport/config.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Server:".bold());
    println!("  Listen: {}:{}", spec.server.bind_address, spec.server.port);
    println!();

    println!("{}", "Storage:".bold());
    println!("  Data dir: {}", spec.storage.data_dir.display());
    println!("  Shares root: {}", spec.storage.shares_root.display());
    println!();

    println!("{}", "Docker:".bold());
    println!("  Binary: {}", spec.docker.binary);
    println!("  Data root: {}", spec.docker.data_root.display());
    let timeouts = &spec.docker.timeouts;
    println!(
        "  Timeouts: create {}s, control {}s, compose {}s, teardown {}s",
        timeouts.create.as_secs(),
        timeouts.control.as_secs(),
        timeouts.compose.as_secs(),
        timeouts.teardown.as_secs()
    );
    println!();

    println!("{}", "Sessions:".bold());
    println!("  TTL: {}s", spec.auth.session_ttl.as_secs());
    println!("  Sweep interval: {}s", spec.auth.sweep_interval.as_secs());
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = ControlPlaneConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: &Path, force: bool) -> Result<()> {
    write_default_config(output, force)?;
    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );
    Ok(())
}

fn write_default_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }
    let yaml = ControlPlaneConfig::default()
        .to_yaml_string()
        .context("Failed to render default configuration")?;
    std::fs::write(output, yaml)
        .with_context(|| format!("Failed to write config to {:?}", output))?;
    Ok(())
}
