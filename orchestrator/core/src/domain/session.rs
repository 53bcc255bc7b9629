// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::{Identity, Role};

/// Default session lifetime.
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at >= ttl
    }

    pub fn identity(&self) -> Identity {
        Identity {
            username: self.username.clone(),
            role: self.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_is_fixed_from_creation() {
        let created = Utc::now();
        let session = Session {
            token: "t".to_string(),
            username: "alice".to_string(),
            role: Role::User,
            created_at: created,
        };
        let ttl = Duration::hours(DEFAULT_SESSION_TTL_HOURS);
        assert!(!session.is_expired(created + Duration::hours(23), ttl));
        assert!(session.is_expired(created + Duration::hours(24), ttl));
    }
}
