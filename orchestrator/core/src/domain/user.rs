// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const MAX_USERNAME_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => f.write_str("admin"),
            Role::User => f.write_str("user"),
        }
    }
}

/// A control-plane account. The username is stored lowercased so lookups are
/// case-insensitive; the bcrypt hash carries its own salt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn identity(&self) -> Identity {
        Identity {
            username: self.username.clone(),
            role: self.role,
        }
    }
}

/// Who is asking. Resolved from a session token by the auth gate and passed
/// to every application service call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub role: Role,
}

impl Identity {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: normalize_username(&username.into()),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UsernameError {
    #[error("Username must be 1-64 characters")]
    Length,
    #[error("Username may only contain letters, digits, '_', '-' and '.'")]
    Characters,
}

pub fn normalize_username(username: &str) -> String {
    username.trim().to_lowercase()
}

/// Validate and normalize a username.
pub fn validate_username(username: &str) -> Result<String, UsernameError> {
    let normalized = normalize_username(username);
    if normalized.is_empty() || normalized.chars().count() > MAX_USERNAME_LEN {
        return Err(UsernameError::Length);
    }
    if !normalized
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(UsernameError::Characters);
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usernames_are_case_insensitive() {
        assert_eq!(validate_username("  Alice ").unwrap(), "alice");
        assert_eq!(Identity::new("BOB", Role::User).username, "bob");
    }

    #[test]
    fn test_invalid_usernames() {
        assert_eq!(validate_username(""), Err(UsernameError::Length));
        assert_eq!(validate_username("a b"), Err(UsernameError::Characters));
        assert_eq!(validate_username(&"x".repeat(65)), Err(UsernameError::Length));
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        let role: Role = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, Role::User);
    }
}
