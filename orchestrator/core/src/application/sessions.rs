// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Session table.
//!
//! Sessions live in memory and are snapshotted to the session repository on
//! every change so a restart keeps users logged in. Expiry is checked lazily
//! on resolve and eagerly by a periodic sweep.

use chrono::{Duration as ChronoDuration, Utc};
use rand_core::{OsRng, RngCore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::repository::{RepositoryError, SessionRepository};
use crate::domain::session::Session;
use crate::domain::user::Identity;

const TOKEN_BYTES: usize = 32;

pub struct SessionManager {
    sessions: RwLock<HashMap<String, Session>>,
    repository: Arc<dyn SessionRepository>,
    ttl: ChronoDuration,
}

impl SessionManager {
    /// Restore the persisted table, dropping sessions that expired while the
    /// process was down.
    pub async fn load(
        repository: Arc<dyn SessionRepository>,
        ttl: Duration,
    ) -> Result<Self, RepositoryError> {
        let ttl = ChronoDuration::from_std(ttl)
            .map_err(|e| RepositoryError::Serialization(format!("session ttl: {}", e)))?;
        let now = Utc::now();
        let stored = repository.load_all().await?;
        let total = stored.len();
        let sessions: HashMap<String, Session> = stored
            .into_iter()
            .filter(|s| !s.is_expired(now, ttl))
            .map(|s| (s.token.clone(), s))
            .collect();

        info!(restored = sessions.len(), expired = total - sessions.len(), "Session table loaded");
        Ok(Self {
            sessions: RwLock::new(sessions),
            repository,
            ttl,
        })
    }

    pub async fn create(&self, identity: &Identity) -> Result<Session, RepositoryError> {
        let session = Session {
            token: generate_token(),
            username: identity.username.clone(),
            role: identity.role,
            created_at: Utc::now(),
        };

        let mut sessions = self.sessions.write().await;
        sessions.insert(session.token.clone(), session.clone());
        self.persist(&sessions).await?;
        debug!(user = %session.username, "Session created");
        Ok(session)
    }

    /// Identity behind `token`, or `None` if unknown or expired. Expired
    /// entries are evicted on the spot.
    pub async fn resolve(&self, token: &str) -> Option<Identity> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(token) {
                None => return None,
                Some(session) if !session.is_expired(now, self.ttl) => {
                    return Some(session.identity())
                }
                Some(_) => {}
            }
        }

        let mut sessions = self.sessions.write().await;
        if sessions.remove(token).is_some() {
            if let Err(e) = self.persist(&sessions).await {
                warn!(error = %e, "Failed to persist session table after eviction");
            }
        }
        None
    }

    pub async fn revoke(&self, token: &str) -> Result<bool, RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(token).is_some();
        if removed {
            self.persist(&sessions).await?;
        }
        Ok(removed)
    }

    /// Drop every session of `username`; used when an account is deleted or
    /// its role or password changes.
    pub async fn revoke_user(&self, username: &str) -> Result<usize, RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| s.username != username);
        let removed = before - sessions.len();
        if removed > 0 {
            self.persist(&sessions).await?;
        }
        Ok(removed)
    }

    /// Remove expired sessions, returning how many were dropped.
    pub async fn sweep(&self) -> Result<usize, RepositoryError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now, self.ttl));
        let removed = before - sessions.len();
        if removed > 0 {
            self.persist(&sessions).await?;
            debug!(removed, "Swept expired sessions");
        }
        Ok(removed)
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep().await {
                    warn!(error = %e, "Session sweep failed");
                }
            }
        })
    }

    async fn persist(&self, sessions: &HashMap<String, Session>) -> Result<(), RepositoryError> {
        self.repository
            .replace_all(sessions.values().cloned().collect())
            .await
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::user::Role;
    use crate::infrastructure::repositories::JsonSessionRepository;

    async fn manager(ttl: Duration) -> (SessionManager, Arc<JsonSessionRepository>) {
        let repo = Arc::new(JsonSessionRepository::in_memory());
        let manager = SessionManager::load(repo.clone(), ttl).await.unwrap();
        (manager, repo)
    }

    #[tokio::test]
    async fn test_create_resolve_revoke() {
        let (manager, repo) = manager(Duration::from_secs(3600)).await;
        let session = manager
            .create(&Identity::new("Alice", Role::User))
            .await
            .unwrap();

        assert_eq!(session.token.len(), TOKEN_BYTES * 2);
        assert_eq!(
            manager.resolve(&session.token).await,
            Some(Identity::new("alice", Role::User))
        );
        assert_eq!(repo.load_all().await.unwrap().len(), 1);

        assert!(manager.revoke(&session.token).await.unwrap());
        assert_eq!(manager.resolve(&session.token).await, None);
        assert!(repo.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_sessions_are_evicted() {
        let (manager, repo) = manager(Duration::from_millis(1)).await;
        let session = manager
            .create(&Identity::new("bob", Role::Admin))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(manager.resolve(&session.token).await, None);
        assert_eq!(manager.active_count().await, 0);
        assert!(repo.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_drops_expired_snapshot_entries() {
        let repo = Arc::new(JsonSessionRepository::in_memory());
        repo.replace_all(vec![
            Session {
                token: "old".to_string(),
                username: "a".to_string(),
                role: Role::User,
                created_at: Utc::now() - ChronoDuration::hours(48),
            },
            Session {
                token: "fresh".to_string(),
                username: "b".to_string(),
                role: Role::User,
                created_at: Utc::now(),
            },
        ])
        .await
        .unwrap();

        let manager = SessionManager::load(repo, Duration::from_secs(24 * 3600))
            .await
            .unwrap();
        assert_eq!(manager.active_count().await, 1);
        assert!(manager.resolve("fresh").await.is_some());
        assert_eq!(manager.sweep().await.unwrap(), 0);
    }
}
