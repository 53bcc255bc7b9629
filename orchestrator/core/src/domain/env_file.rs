// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Stack `.env` handling.
//!
//! Reinstalling a stack must not rotate database credentials that are
//! already baked into a persisted data volume, so keys with a
//! [`PRESERVED_PREFIXES`] prefix survive from the previous file and win over
//! the new payload. Every other key is taken from the new payload only.

use std::collections::BTreeMap;

use crate::domain::sanitizer::{sanitize_env_value, validate_env_name, SanitizeError};

/// Keys carried over from an existing `.env` on reinstall.
pub const PRESERVED_PREFIXES: &[&str] = &["DB_", "POSTGRES_"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvFile {
    entries: BTreeMap<String, String>,
}

impl EnvFile {
    /// Parse `KEY=value` lines. Blank lines, comments and lines whose key is
    /// not a valid variable name are skipped.
    pub fn parse(content: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            if validate_env_name(key).is_err() {
                continue;
            }
            entries.insert(key.to_string(), unquote(value.trim()).to_string());
        }
        Self { entries }
    }

    /// Build from already-validated entries; values are sanitized again so a
    /// file we write can never carry metacharacters.
    pub fn from_entries(entries: BTreeMap<String, String>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k, sanitize_env_value(&v)))
            .collect();
        Self { entries }
    }

    /// Merge for a reinstall: `incoming` replaces the file, except that
    /// preserved keys from `existing` are kept and take priority.
    pub fn merge_for_reinstall(existing: Option<&EnvFile>, incoming: BTreeMap<String, String>) -> Self {
        let mut merged = Self::from_entries(incoming);
        if let Some(previous) = existing {
            for (key, value) in &previous.entries {
                if is_preserved(key) {
                    merged
                        .entries
                        .insert(key.clone(), sanitize_env_value(value));
                }
            }
        }
        merged
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    /// One `KEY=value` line per entry. A value spanning lines would smuggle
    /// extra keys past validation, so it is refused.
    pub fn render(&self) -> Result<String, SanitizeError> {
        let mut out = String::new();
        for (key, value) in &self.entries {
            if value.contains(['\n', '\r']) {
                return Err(SanitizeError::MultilineEnvValue(key.clone()));
            }
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        Ok(out)
    }
}

pub fn is_preserved(key: &str) -> bool {
    PRESERVED_PREFIXES.iter().any(|prefix| key.starts_with(prefix))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
