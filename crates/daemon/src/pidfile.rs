// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Singleton enforcement: one exclusive-locked PID file per state directory
//! (§4.7 "The Daemon maintains a single PID file to enforce singleton
//! semantics on a host").

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::DaemonError;

/// Holds the exclusive lock for as long as it's alive; the lock is released
/// automatically when this is dropped, and `remove` best-effort deletes the
/// file itself on a clean shutdown.
pub struct PidFile {
    path: PathBuf,
    // Held only to keep the exclusive lock; never read after acquisition.
    _file: File,
}

impl PidFile {
    /// Acquire the lock at `path`, truncating and writing the current PID
    /// only after the lock is held — never before, so a failed acquisition
    /// never clobbers the running daemon's PID.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, DaemonError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().write(true).create(true).truncate(false).open(&path)?;
        file.try_lock_exclusive().map_err(|e| DaemonError::LockFailed(path.clone(), e))?;

        let mut file = file;
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;

        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Best-effort removal; called on graceful shutdown (§4.7).
    pub fn remove(&self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!(error = %e, path = %self.path.display(), "failed to remove PID file");
            }
        }
    }
}
