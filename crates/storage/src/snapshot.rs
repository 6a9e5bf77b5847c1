// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot persistence for crash recovery.
//!
//! A snapshot captures the complete [`MaterializedState`] at a WAL sequence
//! number. Recovery loads the snapshot, migrates it to the current schema
//! version, and replays only the WAL entries after that sequence.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::migration::CURRENT_STATE_VERSION;
use crate::state::MaterializedState;
use crate::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "v")]
    pub version: u32,
    /// WAL sequence number at the time of the snapshot.
    pub seq: u64,
    pub state: MaterializedState,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(seq: u64, state: MaterializedState, created_at: DateTime<Utc>) -> Self {
        Self { version: CURRENT_STATE_VERSION, seq, state, created_at }
    }

    /// Write the snapshot as zstd-compressed JSON.
    pub fn write_to(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_vec(self)?;
        let compressed = zstd::encode_all(json.as_slice(), 0)?;
        let tmp = path.with_extension("tmp");
        {
            let mut f = File::create(&tmp)?;
            f.write_all(&compressed)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self, StoreError> {
        let mut compressed = Vec::new();
        File::open(path)?.read_to_end(&mut compressed)?;
        let json = zstd::decode_all(compressed.as_slice())?;
        Ok(serde_json::from_slice(&json)?)
    }
}

const MAX_BAK_FILES: u32 = 3;

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
///
/// Keeps up to [`MAX_BAK_FILES`] backups: `.bak`, `.bak.2`, `.bak.3`. The
/// oldest backup is removed when the limit is reached.
pub(crate) fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }

    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }

    bak(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_zstd_compression() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.zst");
        let snap = Snapshot::new(7, MaterializedState::new(), Utc::now());
        snap.write_to(&path).unwrap();

        let loaded = Snapshot::read_from(&path).unwrap();
        assert_eq!(loaded.seq, 7);
        assert_eq!(loaded.version, CURRENT_STATE_VERSION);
    }

    #[test]
    fn rotation_keeps_at_most_three_backups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wal");

        for round in 1u8..=4 {
            fs::write(&path, [round; 4]).unwrap();
            let target = rotate_bak_path(&path);
            fs::rename(&path, &target).unwrap();
        }

        assert_eq!(fs::read(path.with_extension("bak")).unwrap(), vec![4u8; 4]);
        assert_eq!(fs::read(path.with_extension("bak.2")).unwrap(), vec![3u8; 4]);
        assert_eq!(fs::read(path.with_extension("bak.3")).unwrap(), vec![2u8; 4]);
        assert!(!path.with_extension("bak.4").exists());
    }
}
