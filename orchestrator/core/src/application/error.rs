// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Error type shared by every application service.
//!
//! Validation failures are always raised before any side effect. Runtime
//! failures carry the command's diagnostic output so it can be shown to the
//! operator unchanged.

use thiserror::Error;

use crate::domain::compose::ComposeError;
use crate::domain::permissions::PolicyDecision;
use crate::domain::repository::RepositoryError;
use crate::domain::runtime::RuntimeError;
use crate::domain::sanitizer::SanitizeError;
use crate::domain::user::UsernameError;

#[derive(Debug, Error)]
pub enum OperationError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Execution failed: {message}")]
    Execution {
        message: String,
        output: Option<String>,
    },

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type OperationResult<T> = Result<T, OperationError>;

impl OperationError {
    pub fn validation(message: impl Into<String>) -> Self {
        OperationError::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        OperationError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        OperationError::NotFound(message.into())
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        OperationError::Storage(err.to_string())
    }
}

/// Turn a policy denial into `Forbidden`.
pub fn ensure_allowed(decision: PolicyDecision) -> OperationResult<()> {
    match decision {
        PolicyDecision::Allow => Ok(()),
        PolicyDecision::Deny(reason) => Err(OperationError::Forbidden(reason)),
    }
}

impl From<SanitizeError> for OperationError {
    fn from(err: SanitizeError) -> Self {
        OperationError::Validation(err.to_string())
    }
}

impl From<UsernameError> for OperationError {
    fn from(err: UsernameError) -> Self {
        OperationError::Validation(err.to_string())
    }
}

impl From<ComposeError> for OperationError {
    fn from(err: ComposeError) -> Self {
        OperationError::Validation(err.to_string())
    }
}

impl From<RepositoryError> for OperationError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => OperationError::NotFound(what),
            RepositoryError::AlreadyExists(what) => {
                OperationError::Conflict(format!("{} already exists", what))
            }
            other => OperationError::Storage(other.to_string()),
        }
    }
}

impl From<RuntimeError> for OperationError {
    fn from(err: RuntimeError) -> Self {
        if let RuntimeError::NotFound(name) = &err {
            return OperationError::NotFound(format!("container '{}'", name));
        }
        let output = err.output().map(str::to_string);
        OperationError::Execution {
            message: err.to_string(),
            output,
        }
    }
}

impl From<std::io::Error> for OperationError {
    fn from(err: std::io::Error) -> Self {
        OperationError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_failure_keeps_output() {
        let err: OperationError = RuntimeError::CommandFailed {
            command: "docker run".to_string(),
            code: Some(125),
            output: "pull access denied".to_string(),
        }
        .into();
        match err {
            OperationError::Execution { output, .. } => {
                assert_eq!(output.as_deref(), Some("pull access denied"))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_repository_mapping() {
        assert!(matches!(
            OperationError::from(RepositoryError::AlreadyExists("share 'media'".to_string())),
            OperationError::Conflict(_)
        ));
        assert!(matches!(
            OperationError::from(RepositoryError::Io("disk full".to_string())),
            OperationError::Storage(_)
        ));
        assert!(matches!(
            ensure_allowed(PolicyDecision::Deny("no".to_string())),
            Err(OperationError::Forbidden(_))
        ));
    }
}
