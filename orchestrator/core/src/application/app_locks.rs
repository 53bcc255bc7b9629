// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Per-app-id serialization.
//!
//! Install, uninstall, rebuild, teardown, container actions and log reads of
//! the same id run one at a time; different ids never wait on each other. Guards are owned so an
//! uninstall can hand its guard to the background teardown task.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct AppLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

pub type AppGuard = OwnedMutexGuard<()>;

impl AppLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, app_id: &str) -> AppGuard {
        let lock = self
            .locks
            .entry(app_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_id_waits_for_guard() {
        let locks = Arc::new(AppLocks::new());
        let guard = locks.acquire("immich").await;

        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = other.acquire("immich").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_distinct_ids_do_not_block() {
        let locks = AppLocks::new();
        let _plex = locks.acquire("plex").await;
        let jellyfin = tokio::time::timeout(Duration::from_millis(100), locks.acquire("jellyfin")).await;
        assert!(jellyfin.is_ok());
    }
}
