// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The persistent transactional Store.
//!
//! `with_transaction` is the only way to mutate a [`Store`]: the closure
//! runs against a scratch clone of [`MaterializedState`], and the resulting
//! operations are appended to the WAL — and the scratch state swapped in —
//! only once the closure returns `Ok`. An `Err` return, or a panic inside
//! the closure, leaves the Store exactly as it was: the scratch clone is
//! simply dropped.

use std::path::Path;

use antfarm_core::{ActiveSession, Run, SessionKey, Step, Story};

use crate::error::StoreError;
use crate::op::StoreOp;
use crate::state::MaterializedState;
use crate::wal::Wal;

pub struct Store {
    wal: Wal,
    state: MaterializedState,
}

impl Store {
    /// Open the Store backed by a WAL at `path`, replaying every entry to
    /// rebuild [`MaterializedState`] from scratch.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let wal = Wal::open(path, 0)?;
        let mut state = MaterializedState::new();
        for entry in wal.entries_after(0)? {
            state.apply(&entry.op);
        }
        Ok(Self { wal, state })
    }

    pub fn state(&self) -> &MaterializedState {
        &self.state
    }

    /// Run `f` against a scratch copy of the current state. Its writes are
    /// visible to later calls within the same closure (read-your-own-writes)
    /// but are committed to the WAL and swapped into `self.state` only if
    /// `f` returns `Ok`.
    pub fn with_transaction<T, E>(
        &mut self,
        f: impl FnOnce(&mut Transaction) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut txn = Transaction { scratch: self.state.clone(), ops: Vec::new() };
        let result = f(&mut txn)?;

        for op in &txn.ops {
            self.wal.append(op).map_err(StoreError::from)?;
        }
        if self.wal.needs_flush() {
            self.wal.flush().map_err(StoreError::from)?;
        }
        self.state = txn.scratch;
        Ok(result)
    }
}

/// The scratch view a `with_transaction` closure reads and writes through.
pub struct Transaction {
    scratch: MaterializedState,
    ops: Vec<StoreOp>,
}

impl Transaction {
    pub fn state(&self) -> &MaterializedState {
        &self.scratch
    }

    pub fn put_run(&mut self, run: Run) {
        self.stage(StoreOp::PutRun(run));
    }

    /// Insert a new step, rejecting a `step_index` already used by another
    /// step in the same run.
    pub fn insert_step(&mut self, step: Step) -> Result<(), StoreError> {
        let clashes = self
            .scratch
            .steps_for_run(&step.run_id)
            .iter()
            .any(|s| s.step_index == step.step_index && s.id != step.id);
        if clashes {
            return Err(StoreError::DuplicateStepIndex {
                run: step.run_id.to_string(),
                index: step.step_index,
            });
        }
        self.stage(StoreOp::PutStep(step));
        Ok(())
    }

    pub fn put_step(&mut self, step: Step) {
        self.stage(StoreOp::PutStep(step));
    }

    pub fn put_story(&mut self, story: Story) {
        self.stage(StoreOp::PutStory(story));
    }

    pub fn put_active_session(&mut self, session: ActiveSession) {
        self.stage(StoreOp::PutActiveSession(session));
    }

    pub fn remove_active_session(&mut self, key: &SessionKey) {
        self.stage(StoreOp::RemoveActiveSession(key.clone()));
    }

    fn stage(&mut self, op: StoreOp) {
        self.scratch.apply(&op);
        self.ops.push(op);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use antfarm_core::{RunStatus, Step, StepType};
    use tempfile::tempdir;
    use thiserror::Error;

    #[derive(Debug, Error)]
    enum TestError {
        #[error(transparent)]
        Store(#[from] StoreError),
        #[error("rejected")]
        Rejected,
    }

    #[test]
    fn committed_transaction_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.wal");
        let run = Run::builder().status(RunStatus::Running).build();

        {
            let mut store = Store::open(&path).unwrap();
            store
                .with_transaction::<_, TestError>(|txn| {
                    txn.put_run(run.clone());
                    Ok(())
                })
                .unwrap();
            assert!(store.state().run(&run.id).is_some());
        }

        let reopened = Store::open(&path).unwrap();
        assert!(reopened.state().run(&run.id).is_some());
    }

    #[test]
    fn failed_closure_leaves_state_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.wal");
        let run = Run::builder().build();

        let mut store = Store::open(&path).unwrap();
        let result = store.with_transaction::<(), TestError>(|txn| {
            txn.put_run(run.clone());
            Err(TestError::Rejected)
        });

        assert!(result.is_err());
        assert!(store.state().run(&run.id).is_none());
    }

    #[test]
    fn panicking_closure_leaves_state_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.wal");
        let run = Run::builder().build();
        let run_id = run.id;

        let mut store = Store::open(&path).unwrap();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            store.with_transaction::<(), TestError>(|txn| {
                txn.put_run(run.clone());
                panic!("boom");
            })
        }));

        assert!(outcome.is_err());
        assert!(store.state().run(&run_id).is_none());
    }

    #[test]
    fn insert_step_rejects_duplicate_index_within_run() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.wal");
        let mut store = Store::open(&path).unwrap();

        let run = Run::builder().build();
        let run_id = run.id;
        let first = Step::builder().run_id(run_id).step_index(0).kind(StepType::Single).build();
        let second = Step::builder().run_id(run_id).step_index(0).kind(StepType::Single).build();

        store
            .with_transaction::<_, TestError>(|txn| {
                txn.put_run(run);
                txn.insert_step(first)?;
                Ok(())
            })
            .unwrap();

        let result = store.with_transaction::<(), TestError>(|txn| {
            txn.insert_step(second)?;
            Ok(())
        });
        assert!(result.is_err());
    }
}
