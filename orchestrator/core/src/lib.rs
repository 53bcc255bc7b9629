// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # homeport-core
//!
//! Orchestration and access-mediation engine of the Homeport control plane.
//! Installs containers and compose stacks on the host, mounts only the shared
//! folders an app was granted, and keeps a registry of what it installed.
//!
//! # Architecture
//!
//! - [`domain`]: entities, sanitization, permission rules, repository and
//!   runtime traits
//! - [`application`]: services (auth, shared folders, Docker settings, app
//!   orchestration)
//! - [`infrastructure`]: JSON document stores, Docker CLI runtime, event bus
//! - [`presentation`]: axum router

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
