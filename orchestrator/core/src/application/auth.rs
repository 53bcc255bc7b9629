// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Auth gate.
//!
//! Accounts are bcrypt-hashed users in the user repository; a successful
//! login mints a bearer token in the [`SessionManager`]. Every other
//! application service takes the [`Identity`] this gate resolves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::application::error::{OperationError, OperationResult};
use crate::application::sessions::SessionManager;
use crate::domain::events::AccessEvent;
use crate::domain::repository::UserRepository;
use crate::domain::user::{normalize_username, validate_username, Identity, Role, User};
use crate::infrastructure::event_bus::EventBus;

pub const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 72;

/// A user as exposed outside the service: never carries the hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            role: user.role,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResult {
    pub token: String,
    pub user: UserView,
}

pub fn require_admin(identity: &Identity) -> OperationResult<()> {
    if identity.is_admin() {
        Ok(())
    } else {
        Err(OperationError::forbidden("Administrator role required"))
    }
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<SessionManager>,
    event_bus: Arc<EventBus>,
    bcrypt_cost: u32,
    setup_lock: Mutex<()>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<SessionManager>,
        event_bus: Arc<EventBus>,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            users,
            sessions,
            event_bus,
            bcrypt_cost,
            setup_lock: Mutex::new(()),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// True until the first administrator exists.
    pub async fn needs_setup(&self) -> OperationResult<bool> {
        Ok(self.users.count().await? == 0)
    }

    /// Create the first administrator. Refused once any user exists.
    pub async fn setup(&self, username: &str, password: &str) -> OperationResult<LoginResult> {
        let _guard = self.setup_lock.lock().await;
        if !self.needs_setup().await? {
            return Err(OperationError::Conflict("Setup has already been completed".to_string()));
        }

        let user = self.build_user(username, password, Role::Admin).await?;
        self.users.create(user.clone()).await?;
        info!(user = %user.username, "Initial administrator created");
        self.event_bus.publish_access_event(AccessEvent::AdminBootstrapped {
            username: user.username.clone(),
            created_at: user.created_at,
        });

        self.open_session(&user).await
    }

    pub async fn login(&self, username: &str, password: &str) -> OperationResult<LoginResult> {
        let username = normalize_username(username);
        let found = self.users.find(&username).await?;
        let verified = match &found {
            Some(user) => verify_password(password, &user.password_hash).await?,
            None => false,
        };
        let user = match found {
            Some(user) if verified => user,
            _ => {
                warn!(user = %username, "Login failed");
                self.event_bus.publish_access_event(AccessEvent::LoginFailed {
                    username,
                    failed_at: Utc::now(),
                });
                return Err(OperationError::Unauthorized);
            }
        };
        info!(user = %user.username, "Login succeeded");
        self.open_session(&user).await
    }

    pub async fn logout(&self, token: &str) -> OperationResult<()> {
        self.sessions.revoke(token).await?;
        Ok(())
    }

    pub async fn resolve(&self, token: &str) -> Option<Identity> {
        self.sessions.resolve(token).await
    }

    /// `Unauthorized` unless `token` names a live session.
    pub async fn authenticate(&self, token: Option<&str>) -> OperationResult<Identity> {
        match token {
            Some(token) => self.resolve(token).await.ok_or(OperationError::Unauthorized),
            None => Err(OperationError::Unauthorized),
        }
    }

    pub async fn me(&self, requester: &Identity) -> OperationResult<UserView> {
        self.users
            .find(&requester.username)
            .await?
            .map(|u| UserView::from(&u))
            .ok_or(OperationError::Unauthorized)
    }

    pub async fn list_users(&self, requester: &Identity) -> OperationResult<Vec<UserView>> {
        require_admin(requester)?;
        Ok(self.users.list_all().await?.iter().map(UserView::from).collect())
    }

    pub async fn create_user(
        &self,
        requester: &Identity,
        username: &str,
        password: &str,
        role: Role,
    ) -> OperationResult<UserView> {
        require_admin(requester)?;
        let user = self.build_user(username, password, role).await?;
        self.users.create(user.clone()).await?;

        info!(user = %user.username, role = %user.role, by = %requester.username, "User created");
        self.event_bus.publish_access_event(AccessEvent::UserCreated {
            username: user.username.clone(),
            created_by: requester.username.clone(),
            created_at: user.created_at,
        });
        Ok(UserView::from(&user))
    }

    pub async fn delete_user(&self, requester: &Identity, username: &str) -> OperationResult<()> {
        require_admin(requester)?;
        let username = normalize_username(username);
        if username == requester.username {
            return Err(OperationError::validation("You cannot delete your own account"));
        }

        let target = self
            .users
            .find(&username)
            .await?
            .ok_or_else(|| OperationError::not_found(format!("user '{}'", username)))?;
        if target.role == Role::Admin {
            self.ensure_other_admin_exists(&username).await?;
        }

        self.users.delete(&username).await?;
        self.sessions.revoke_user(&username).await?;

        info!(user = %username, by = %requester.username, "User deleted");
        self.event_bus.publish_access_event(AccessEvent::UserDeleted {
            username,
            deleted_by: requester.username.clone(),
            deleted_at: Utc::now(),
        });
        Ok(())
    }

    pub async fn set_role(
        &self,
        requester: &Identity,
        username: &str,
        role: Role,
    ) -> OperationResult<UserView> {
        require_admin(requester)?;
        let username = normalize_username(username);
        let mut user = self
            .users
            .find(&username)
            .await?
            .ok_or_else(|| OperationError::not_found(format!("user '{}'", username)))?;
        if user.role == role {
            return Ok(UserView::from(&user));
        }
        if user.role == Role::Admin {
            self.ensure_other_admin_exists(&username).await?;
        }

        user.role = role;
        self.users.save(user.clone()).await?;
        // Sessions carry the role they were minted with
        self.sessions.revoke_user(&username).await?;
        info!(user = %username, role = %role, by = %requester.username, "Role changed");
        Ok(UserView::from(&user))
    }

    /// Verify the current password, store the new one and rotate sessions.
    pub async fn change_password(
        &self,
        requester: &Identity,
        current: &str,
        new_password: &str,
    ) -> OperationResult<LoginResult> {
        let mut user = self
            .users
            .find(&requester.username)
            .await?
            .ok_or(OperationError::Unauthorized)?;
        if !verify_password(current, &user.password_hash).await? {
            return Err(OperationError::forbidden("Current password is incorrect"));
        }

        validate_password(new_password)?;
        user.password_hash = hash_password(new_password, self.bcrypt_cost).await?;
        self.users.save(user.clone()).await?;
        self.sessions.revoke_user(&user.username).await?;
        info!(user = %user.username, "Password changed");
        self.open_session(&user).await
    }

    async fn build_user(&self, username: &str, password: &str, role: Role) -> OperationResult<User> {
        let username = validate_username(username)?;
        validate_password(password)?;
        Ok(User {
            username,
            password_hash: hash_password(password, self.bcrypt_cost).await?,
            role,
            created_at: Utc::now(),
        })
    }

    async fn ensure_other_admin_exists(&self, username: &str) -> OperationResult<()> {
        let others = self
            .users
            .list_all()
            .await?
            .iter()
            .filter(|u| u.role == Role::Admin && u.username != username)
            .count();
        if others == 0 {
            return Err(OperationError::Conflict(
                "At least one administrator must remain".to_string(),
            ));
        }
        Ok(())
    }

    async fn open_session(&self, user: &User) -> OperationResult<LoginResult> {
        let session = self.sessions.create(&user.identity()).await?;
        Ok(LoginResult {
            token: session.token,
            user: UserView::from(user),
        })
    }
}

fn validate_password(password: &str) -> OperationResult<()> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(OperationError::validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    // bcrypt ignores everything past 72 bytes
    if password.len() > MAX_PASSWORD_LEN {
        return Err(OperationError::validation(format!(
            "Password must be at most {} bytes",
            MAX_PASSWORD_LEN
        )));
    }
    Ok(())
}

async fn hash_password(password: &str, cost: u32) -> OperationResult<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| OperationError::Storage(format!("hashing task failed: {}", e)))?
        .map_err(|e| OperationError::Storage(format!("password hashing failed: {}", e)))
}

async fn verify_password(password: &str, hash: &str) -> OperationResult<bool> {
    let password = password.to_string();
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| OperationError::Storage(format!("verification task failed: {}", e)))?
        .or(Ok(false))
}
