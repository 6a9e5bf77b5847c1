// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The append-only Event Journal.
//!
//! Distinct from `antfarm-storage`'s WAL: this log is externally observable
//! (newline-delimited JSON, queryable, webhook-forwarded) and is never
//! replayed to rebuild engine state. A malformed line here is simply
//! skipped — the journal is a best-effort audit trail, not a source of
//! truth.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use antfarm_core::Event;

use crate::error::JournalError;
use crate::webhook::WebhookSink;

/// Rotate to a `.1` backup once the active file reaches this size.
const MAX_JOURNAL_BYTES: u64 = 10 * 1024 * 1024;

pub struct Journal {
    path: PathBuf,
    webhook: Option<WebhookSink>,
}

impl Journal {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), webhook: None }
    }

    pub fn with_webhook(mut self, url: impl Into<String>) -> Self {
        self.webhook = Some(WebhookSink::new(url));
        self
    }

    /// Append `event` and, if a webhook is configured, fan it out. Never
    /// fails: any I/O or serialization error is logged and swallowed so a
    /// journal problem can never abort a pipeline transition.
    pub fn emit(&self, event: &Event) {
        if let Err(err) = self.append(event) {
            tracing::warn!(error = %err, "failed to append event to journal");
        }
        if let Some(webhook) = &self.webhook {
            webhook.dispatch(event.clone());
        }
    }

    /// The most recent `limit` events across the active file and its `.1`
    /// backup, oldest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<Event>, JournalError> {
        let mut events = self.read_all()?;
        truncate_to_last(&mut events, limit);
        Ok(events)
    }

    /// The most recent `limit` events whose `run_id` starts with `run_id_prefix`.
    pub fn by_run(&self, run_id_prefix: &str, limit: usize) -> Result<Vec<Event>, JournalError> {
        let mut events: Vec<Event> = self
            .read_all()?
            .into_iter()
            .filter(|e| e.run_id.as_str().starts_with(run_id_prefix))
            .collect();
        truncate_to_last(&mut events, limit);
        Ok(events)
    }

    fn append(&self, event: &Event) -> Result<(), JournalError> {
        self.rotate_if_needed()?;
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn rotate_if_needed(&self) -> Result<(), JournalError> {
        if let Ok(meta) = fs::metadata(&self.path) {
            if meta.len() >= MAX_JOURNAL_BYTES {
                fs::rename(&self.path, self.backup_path())?;
            }
        }
        Ok(())
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".1");
        self.path.with_file_name(name)
    }

    fn read_all(&self) -> Result<Vec<Event>, JournalError> {
        let mut events = Vec::new();
        let backup = self.backup_path();
        if backup.exists() {
            events.extend(read_events(&backup)?);
        }
        if self.path.exists() {
            events.extend(read_events(&self.path)?);
        }
        Ok(events)
    }
}

fn read_events(path: &Path) -> Result<Vec<Event>, JournalError> {
    let content = fs::read_to_string(path)?;
    let mut events = Vec::with_capacity(content.lines().count());
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Event>(line) {
            Ok(event) => events.push(event),
            Err(err) => tracing::warn!(error = %err, "skipping malformed journal line"),
        }
    }
    Ok(events)
}

fn truncate_to_last(events: &mut Vec<Event>, limit: usize) {
    let len = events.len();
    if len > limit {
        events.drain(0..len - limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use antfarm_core::{EventKind, RunId};
    use tempfile::tempdir;

    fn event(run_id: RunId, kind: EventKind) -> Event {
        Event::new(kind, run_id).with_ts("2026-01-01T00:00:00Z")
    }

    #[test]
    fn emit_then_recent_round_trips() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(dir.path().join("journal.ndjson"));
        let run_id = RunId::new();

        journal.emit(&event(run_id, EventKind::RunStarted));
        journal.emit(&event(run_id, EventKind::RunCompleted));

        let recent = journal.recent(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].event, EventKind::RunStarted);
        assert_eq!(recent[1].event, EventKind::RunCompleted);
    }

    #[test]
    fn recent_respects_limit() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(dir.path().join("journal.ndjson"));
        let run_id = RunId::new();

        for _ in 0..5 {
            journal.emit(&event(run_id, EventKind::PipelineAdvanced));
        }

        assert_eq!(journal.recent(2).unwrap().len(), 2);
    }

    #[test]
    fn by_run_filters_on_prefix() {
        let dir = tempdir().unwrap();
        let journal = Journal::open(dir.path().join("journal.ndjson"));
        let run_a = RunId::from_string("run-aaaaaaaaaaaaaaaaaaa");
        let run_b = RunId::from_string("run-bbbbbbbbbbbbbbbbbbb");

        journal.emit(&event(run_a, EventKind::RunStarted));
        journal.emit(&event(run_b, EventKind::RunStarted));

        let matches = journal.by_run("run-aaa", 10).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].run_id, run_a);
    }

    #[test]
    fn malformed_line_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.ndjson");
        let journal = Journal::open(&path);
        let run_id = RunId::new();

        journal.emit(&event(run_id, EventKind::RunStarted));
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(b"not-json\n").unwrap();
        }
        journal.emit(&event(run_id, EventKind::RunCompleted));

        let events = journal.recent(10).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn rotates_to_backup_past_size_threshold() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.ndjson");
        fs::write(&path, vec![b'x'; MAX_JOURNAL_BYTES as usize]).unwrap();

        let journal = Journal::open(&path);
        journal.emit(&event(RunId::new(), EventKind::RunStarted));

        assert!(journal.backup_path().exists());
        assert_eq!(fs::metadata(&journal.backup_path()).unwrap().len(), MAX_JOURNAL_BYTES);
        assert!(fs::metadata(&path).unwrap().len() < MAX_JOURNAL_BYTES);
    }
}
