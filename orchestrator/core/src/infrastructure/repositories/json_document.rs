// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Single-owner JSON document.
//!
//! Each persisted file is owned by exactly one `JsonDocument`. Mutations run
//! as closures under the document's async mutex against a working copy; the
//! copy is written to `{file}.tmp`, synced, renamed over the original, and
//! only then becomes the in-memory state. A failed write leaves both the file
//! and the in-memory value unchanged.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::repository::RepositoryError;

pub struct JsonDocument<T> {
    path: Option<PathBuf>,
    state: Mutex<T>,
}

impl<T> JsonDocument<T>
where
    T: Serialize + DeserializeOwned + Clone + Send,
{
    /// Load `path`, or start from `default` when the file is missing or empty.
    pub async fn open(path: impl Into<PathBuf>, default: T) -> Result<Self, RepositoryError> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => default,
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                RepositoryError::Serialization(format!("{}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => default,
            Err(e) => return Err(RepositoryError::Io(format!("{}: {}", path.display(), e))),
        };
        debug!(path = %path.display(), "Opened JSON document");
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// Unpersisted document, for tests and ephemeral deployments.
    pub fn in_memory(initial: T) -> Self {
        Self {
            path: None,
            state: Mutex::new(initial),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let state = self.state.lock().await;
        f(&state)
    }

    pub async fn snapshot(&self) -> T {
        self.state.lock().await.clone()
    }

    /// Apply `f` and persist. If `f` fails nothing is written.
    pub async fn update<R>(
        &self,
        f: impl FnOnce(&mut T) -> Result<R, RepositoryError>,
    ) -> Result<R, RepositoryError> {
        let mut state = self.state.lock().await;
        let mut working = state.clone();
        let result = f(&mut working)?;
        if let Some(path) = &self.path {
            write_atomic(path, &working).await?;
        }
        *state = working;
        Ok(result)
    }
}

async fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), RepositoryError> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| RepositoryError::Serialization(e.to_string()))?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| RepositoryError::Io(format!("{}: {}", parent.display(), e)))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let io_err = |e: std::io::Error| RepositoryError::Io(format!("{}: {}", tmp.display(), e));
    let mut file = tokio::fs::File::create(&tmp).await.map_err(io_err)?;
    file.write_all(&bytes).await.map_err(io_err)?;
    file.sync_all().await.map_err(io_err)?;
    drop(file);
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| RepositoryError::Io(format!("{}: {}", path.display(), e)))?;
    Ok(())
}
