// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-ahead log of [`StoreOp`]s.
//!
//! The WAL is the Store's internal durability mechanism: every row mutation
//! is appended here before [`crate::MaterializedState`] is updated in
//! memory. It is distinct from the externally-observable Event Journal in
//! `antfarm-events` — this log is never read by anything outside the Store.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::op::StoreOp;
use crate::snapshot::rotate_bak_path;
use crate::WalError;

/// Flush after this many unflushed appends, regardless of elapsed time.
const FLUSH_THRESHOLD: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub seq: u64,
    pub op: StoreOp,
}

/// An append-only, crash-tolerant log of [`StoreOp`]s.
///
/// Corruption is handled only at [`Wal::open`]: a trailing line that is not
/// valid UTF-8 or not a valid [`WalEntry`] is treated as the end of the
/// log, the on-disk file is rotated to `.bak` (keeping up to three
/// generations), and a clean file containing only the entries parsed so far
/// is written in its place. Once open, the in-memory entry list is the
/// single source of truth for `next_unprocessed`/`entries_after` — it is
/// never re-read from disk.
pub struct Wal {
    path: PathBuf,
    entries: Vec<WalEntry>,
    pending: String,
    write_seq: u64,
    processed_seq: u64,
    cursor: u64,
    appended_since_flush: u32,
}

impl Wal {
    /// Open (or create) the WAL at `path`. `processed_seq` seeds the
    /// unprocessed-entry cursor, normally taken from the snapshot this WAL
    /// tail is being replayed on top of.
    pub fn open(path: &Path, processed_seq: u64) -> Result<Self, WalError> {
        let (entries, had_corruption) = read_valid_entries(path)?;

        if had_corruption {
            let bak = rotate_bak_path(path);
            if path.exists() {
                fs::rename(path, &bak)?;
            }
        }

        if had_corruption || !path.exists() {
            write_entries(path, &entries)?;
        }

        let write_seq = entries.last().map(|e| e.seq).unwrap_or(0);

        Ok(Self {
            path: path.to_path_buf(),
            entries,
            pending: String::new(),
            write_seq,
            processed_seq,
            cursor: processed_seq,
            appended_since_flush: 0,
        })
    }

    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    pub fn processed_seq(&self) -> u64 {
        self.processed_seq
    }

    /// Append one operation, returning its assigned sequence number. The
    /// entry is visible to `next_unprocessed`/`entries_after` immediately;
    /// it reaches disk at the next [`Wal::flush`].
    pub fn append(&mut self, op: &StoreOp) -> Result<u64, WalError> {
        self.write_seq += 1;
        let entry = WalEntry { seq: self.write_seq, op: op.clone() };
        let line = serde_json::to_string(&entry)?;
        self.pending.push_str(&line);
        self.pending.push('\n');
        self.entries.push(entry);
        self.appended_since_flush += 1;
        Ok(self.write_seq)
    }

    /// Flush buffered appends to disk.
    pub fn flush(&mut self) -> Result<(), WalError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(self.pending.as_bytes())?;
        file.flush()?;
        self.pending.clear();
        self.appended_since_flush = 0;
        Ok(())
    }

    /// Whether enough unflushed appends have accumulated to warrant a flush.
    pub fn needs_flush(&self) -> bool {
        self.appended_since_flush >= FLUSH_THRESHOLD
    }

    /// Mark entries up to and including `seq` as durably processed (i.e.
    /// reflected in the last snapshot).
    pub fn mark_processed(&mut self, seq: u64) {
        if seq > self.processed_seq {
            self.processed_seq = seq;
        }
    }

    /// Pop the next entry after the internal read cursor, if any. Advances
    /// the cursor regardless of `processed_seq` — callers decide when to
    /// call `mark_processed`.
    pub fn next_unprocessed(&mut self) -> Result<Option<WalEntry>, WalError> {
        let next_seq = self.cursor + 1;
        if let Some(entry) = self.entries.iter().find(|e| e.seq == next_seq) {
            self.cursor = next_seq;
            return Ok(Some(entry.clone()));
        }
        Ok(None)
    }

    /// All entries with `seq` strictly greater than `seq`.
    pub fn entries_after(&self, seq: u64) -> Result<Vec<WalEntry>, WalError> {
        Ok(self.entries.iter().filter(|e| e.seq > seq).cloned().collect())
    }

    /// Drop entries with `seq` strictly less than `seq` and compact the
    /// on-disk file, normally called right after a snapshot is durably
    /// written.
    pub fn truncate_before(&mut self, seq: u64) -> Result<(), WalError> {
        self.flush()?;
        self.entries.retain(|e| e.seq >= seq);
        write_entries(&self.path, &self.entries)
    }
}

fn read_valid_entries(path: &Path) -> Result<(Vec<WalEntry>, bool), WalError> {
    if !path.exists() {
        return Ok((Vec::new(), false));
    }

    let bytes = fs::read(path)?;
    let mut entries = Vec::new();
    let mut had_corruption = false;

    for line in bytes.split(|&b| b == b'\n') {
        if line.is_empty() {
            continue;
        }
        match std::str::from_utf8(line).ok().and_then(|s| serde_json::from_str::<WalEntry>(s).ok()) {
            Some(entry) => entries.push(entry),
            None => {
                had_corruption = true;
                break;
            }
        }
    }

    Ok((entries, had_corruption))
}

fn write_entries(path: &Path, entries: &[WalEntry]) -> Result<(), WalError> {
    let mut buf = String::new();
    for entry in entries {
        buf.push_str(&serde_json::to_string(entry)?);
        buf.push('\n');
    }
    fs::write(path, buf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use antfarm_core::Run;
    use tempfile::tempdir;

    fn test_op(tag: &str) -> StoreOp {
        StoreOp::PutRun(Run::builder().workflow_id(format!("wf-{tag}")).build())
    }

    fn workflow_id(op: &StoreOp) -> &str {
        match op {
            StoreOp::PutRun(run) => &run.workflow_id,
            _ => panic!("expected PutRun"),
        }
    }

    #[test]
    fn open_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");

        let wal = Wal::open(&path, 0).unwrap();

        assert!(path.exists());
        assert_eq!(wal.write_seq(), 0);
        assert_eq!(wal.processed_seq(), 0);
    }

    #[test]
    fn append_and_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let mut wal = Wal::open(&path, 0).unwrap();

        let seq1 = wal.append(&test_op("cmd1")).unwrap();
        let seq2 = wal.append(&test_op("cmd2")).unwrap();
        assert_eq!(seq1, 1);
        assert_eq!(seq2, 2);

        wal.flush().unwrap();
        assert!(fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn next_unprocessed_walks_entries_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let mut wal = Wal::open(&path, 0).unwrap();

        wal.append(&test_op("cmd1")).unwrap();
        wal.append(&test_op("cmd2")).unwrap();

        let entry1 = wal.next_unprocessed().unwrap().unwrap();
        assert_eq!(entry1.seq, 1);
        assert_eq!(workflow_id(&entry1.op), "wf-cmd1");

        let entry2 = wal.next_unprocessed().unwrap().unwrap();
        assert_eq!(entry2.seq, 2);
        assert_eq!(workflow_id(&entry2.op), "wf-cmd2");

        assert!(wal.next_unprocessed().unwrap().is_none());
    }

    #[test]
    fn mark_processed_sets_watermark() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let mut wal = Wal::open(&path, 0).unwrap();

        wal.append(&test_op("cmd1")).unwrap();
        wal.flush().unwrap();

        let entry = wal.next_unprocessed().unwrap().unwrap();
        wal.mark_processed(entry.seq);

        assert_eq!(wal.processed_seq(), 1);
    }

    #[test]
    fn reopen_with_processed_seq_skips_already_processed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        {
            let mut wal = Wal::open(&path, 0).unwrap();
            wal.append(&test_op("cmd1")).unwrap();
            wal.append(&test_op("cmd2")).unwrap();
            wal.append(&test_op("cmd3")).unwrap();
            wal.flush().unwrap();
        }

        let mut wal = Wal::open(&path, 2).unwrap();
        let entry = wal.next_unprocessed().unwrap().unwrap();
        assert_eq!(entry.seq, 3);
        assert!(wal.next_unprocessed().unwrap().is_none());
    }

    #[test]
    fn entries_after_excludes_already_seen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let mut wal = Wal::open(&path, 0).unwrap();

        wal.append(&test_op("cmd1")).unwrap();
        wal.append(&test_op("cmd2")).unwrap();
        wal.append(&test_op("cmd3")).unwrap();
        wal.flush().unwrap();

        let entries = wal.entries_after(1).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].seq, 2);
        assert_eq!(entries[1].seq, 3);
    }

    #[test]
    fn truncate_before_compacts_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let mut wal = Wal::open(&path, 0).unwrap();

        wal.append(&test_op("cmd1")).unwrap();
        wal.append(&test_op("cmd2")).unwrap();
        wal.append(&test_op("cmd3")).unwrap();
        wal.flush().unwrap();

        wal.truncate_before(2).unwrap();

        let entries = wal.entries_after(0).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].seq, 2);
        assert_eq!(entries[1].seq, 3);
    }

    #[test]
    fn needs_flush_crosses_threshold() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        let mut wal = Wal::open(&path, 0).unwrap();

        assert!(!wal.needs_flush());
        for i in 0..101 {
            wal.append(&test_op(&format!("cmd{i}"))).unwrap();
        }
        assert!(wal.needs_flush());
    }

    #[test]
    fn open_rotates_corrupt_tail_to_bak_and_keeps_valid_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        {
            let mut wal = Wal::open(&path, 0).unwrap();
            wal.append(&test_op("cmd1")).unwrap();
            wal.append(&test_op("cmd2")).unwrap();
            wal.flush().unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(b"not-valid-json\n").unwrap();
        }

        let wal = Wal::open(&path, 0).unwrap();
        assert_eq!(wal.write_seq(), 2);
        assert!(path.with_extension("bak").exists());

        let entries = wal.entries_after(0).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn open_treats_non_utf8_bytes_as_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");
        fs::write(&path, b"\x80\x81\x82\xff\xfe\n").unwrap();

        let wal = Wal::open(&path, 0).unwrap();
        assert_eq!(wal.write_seq(), 0);
        assert!(path.with_extension("bak").exists());
    }
}
