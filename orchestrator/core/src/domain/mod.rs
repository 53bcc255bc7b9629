// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: aggregates, policies and the contracts the outer layers
//! implement.
//!
//! Nothing in here performs I/O except [`config`] reading its manifest file.

pub mod compose;
pub mod config;
pub mod docker_config;
pub mod env_file;
pub mod events;
pub mod installed_app;
pub mod permissions;
pub mod repository;
pub mod runtime;
pub mod sanitizer;
pub mod session;
pub mod shared_folder;
pub mod stack_naming;
pub mod user;
