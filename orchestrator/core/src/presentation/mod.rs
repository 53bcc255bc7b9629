// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`homeport-core`)
//!
//! HTTP surface that translates external requests into application service
//! calls. Authorization decisions are made by the services, not here; this
//! layer only resolves the session and maps errors to status codes.
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`api`] | HTTP (Axum) | REST endpoints for auth, shares, Docker settings and apps |

pub mod api;
