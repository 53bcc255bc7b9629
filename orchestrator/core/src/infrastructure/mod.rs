// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure layer: Docker CLI runtime, JSON persistence and the
//! in-process event bus.

pub mod event_bus;
pub mod repositories;
pub mod runtime;
