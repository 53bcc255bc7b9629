// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Homeport CLI

pub mod config;
pub mod status;

pub use self::config::ConfigCommand;
