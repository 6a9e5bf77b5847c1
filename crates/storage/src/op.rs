// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use antfarm_core::{ActiveSession, Run, SessionKey, Step, Story};
use serde::{Deserialize, Serialize};

/// A single row-level mutation appended to the write-ahead log.
///
/// Every variant carries the complete post-mutation row, so replaying the
/// log into a [`crate::MaterializedState`] is a pure insert/overwrite with
/// no read-modify-write step — applying the same op twice is a no-op on the
/// second application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StoreOp {
    PutRun(Run),
    PutStep(Step),
    PutStory(Story),
    PutActiveSession(ActiveSession),
    RemoveActiveSession(SessionKey),
}
