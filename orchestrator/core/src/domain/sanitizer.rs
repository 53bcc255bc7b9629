// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Name Sanitizer Domain Service
//!
//! Validates every externally supplied identifier (app id, container name,
//! image reference, stack id, path segment, environment entry) before it is
//! interpolated into a runtime command or a host path. This is a domain
//! service rather than infrastructure because refusing unsafe identifiers is
//! a core security rule, not a technical detail of the runtime adapter.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Single choke point between untrusted input and command/filesystem use
//!
//! # Security Guarantees
//! - Only `[A-Za-z0-9_.\-/:]` survives; anything else is rejected outright
//! - Length is bounded to [`MAX_NAME_LEN`]
//! - `..` is rejected anywhere in the string, not only as a path component
//! - There is no partial-sanitization fallback: a rejected name never reaches a command

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Maximum accepted identifier length.
pub const MAX_NAME_LEN: usize = 256;

/// Maximum length of an environment variable value after stripping.
pub const MAX_ENV_VALUE_LEN: usize = 1000;

const ENV_VALUE_METACHARACTERS: &[char] = &['`', '$', '\\', ';', '"', '\'', '|', '&', '<', '>'];

/// Sanitization errors. All of them surface as validation errors to callers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SanitizeError {
    #[error("Identifier is empty")]
    Empty,

    #[error("Identifier is {len} characters long (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("Identifier contains disallowed character {ch:?}: {value}")]
    DisallowedCharacter { value: String, ch: char },

    #[error("Path traversal attempt detected: {0}")]
    PathTraversal(String),

    #[error("Path must be absolute: {0}")]
    NotAbsolute(String),

    #[error("Port out of range 1-65535: {0}")]
    InvalidPort(i64),

    #[error("Invalid environment variable name: {0}")]
    InvalidEnvName(String),

    #[error("Invalid display name: {0}")]
    InvalidDisplayName(String),

    #[error("Environment value for {0} contains a line break")]
    MultilineEnvValue(String),
}

/// An identifier that passed [`sanitize`]. The only way to build one is
/// through the sanitizer, so holding a `SafeName` is proof of validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SafeName(String);

impl SafeName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SafeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SafeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SafeName {
    type Error = SanitizeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        sanitize(&value)
    }
}

impl From<SafeName> for String {
    fn from(name: SafeName) -> Self {
        name.0
    }
}

/// Characters permitted in identifiers.
pub fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/' | ':')
}

/// Validate an identifier destined for a command or a path.
///
/// # Examples
/// ```
/// use homeport_core::domain::sanitizer::sanitize;
///
/// assert_eq!(sanitize("linuxserver/plex:latest").unwrap().as_str(), "linuxserver/plex:latest");
/// assert!(sanitize("plex; rm -rf /").is_err());
/// assert!(sanitize("../etc").is_err());
/// ```
pub fn sanitize(input: &str) -> Result<SafeName, SanitizeError> {
    if input.is_empty() {
        return Err(SanitizeError::Empty);
    }

    let len = input.chars().count();
    if len > MAX_NAME_LEN {
        return Err(SanitizeError::TooLong {
            len,
            max: MAX_NAME_LEN,
        });
    }

    if let Some(ch) = input.chars().find(|c| !is_allowed_char(*c)) {
        tracing::warn!(value = %input.escape_debug(), "Rejected identifier with disallowed character");
        return Err(SanitizeError::DisallowedCharacter {
            value: input.to_string(),
            ch,
        });
    }

    if input.contains("..") {
        tracing::warn!(value = %input, "Path traversal attempt detected: contains '..'");
        return Err(SanitizeError::PathTraversal(input.to_string()));
    }

    Ok(SafeName(input.to_string()))
}

/// Stricter variant for names that become a single path segment and a
/// container name (app ids, share names): `/` and `:` are rejected too.
pub fn sanitize_segment(input: &str) -> Result<SafeName, SanitizeError> {
    let name = sanitize(input)?;
    if let Some(ch) = name.as_str().chars().find(|c| matches!(c, '/' | ':')) {
        return Err(SanitizeError::DisallowedCharacter {
            value: input.to_string(),
            ch,
        });
    }
    Ok(name)
}

/// Validate a host path: sanitizer-clean and absolute.
pub fn sanitize_absolute_path(path: &Path) -> Result<PathBuf, SanitizeError> {
    let raw = path.to_string_lossy();
    sanitize(&raw)?;
    if !path.is_absolute() {
        return Err(SanitizeError::NotAbsolute(raw.to_string()));
    }
    Ok(path.to_path_buf())
}

/// `true` iff `1 <= port <= 65535`.
pub fn is_valid_port(port: i64) -> bool {
    (1..=65535).contains(&port)
}

pub fn validate_port(port: i64) -> Result<u16, SanitizeError> {
    if is_valid_port(port) {
        Ok(port as u16)
    } else {
        Err(SanitizeError::InvalidPort(port))
    }
}

/// Environment variable names must match `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_env_name(name: &str) -> Result<(), SanitizeError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(SanitizeError::InvalidEnvName(name.to_string()))
    }
}

/// Strip shell metacharacters and control characters from an environment
/// value and cap its length. The result always fits on one `.env` line.
pub fn sanitize_env_value(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_control() && !ENV_VALUE_METACHARACTERS.contains(c))
        .take(MAX_ENV_VALUE_LEN)
        .collect()
}

/// Launcher titles are free-form but never reach a command; they only need
/// a sane length and no control characters.
pub fn validate_display_name(name: &str) -> Result<String, SanitizeError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(SanitizeError::InvalidDisplayName("empty".to_string()));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(SanitizeError::InvalidDisplayName(format!(
            "longer than {} characters",
            MAX_NAME_LEN
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(SanitizeError::InvalidDisplayName(
            "contains control characters".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}
