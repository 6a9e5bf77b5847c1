// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! antfarm-sweeper: the Recovery Sweeper (§4.5).
//!
//! Reclaims `running` steps and stories left behind by a worker that died
//! without reporting back, nudges pipelines stuck behind a loop step's last
//! story, rolls back rows stuck in `claiming`, and garbage-collects stale
//! `ActiveSession` rows. Built on `antfarm-storage` for durable state,
//! `antfarm-pipeline` for the Workflow Spec Cache and `advancePipeline`, and
//! `antfarm-events` for the audit journal and webhooks.

mod error;
mod report;
mod sweeper;
mod throttle;

pub use error::SweeperError;
pub use report::{ClaimingSweepReport, SessionGcReport, SweepReport};
pub use sweeper::{
    Sweeper, ABANDONMENT_GRACE, CLAIMING_STALE_AFTER, CLAIMING_SWEEP_INTERVAL,
    GENERAL_SWEEP_INTERVAL, MAX_ABANDONMENTS, SESSION_STALE_AFTER,
};
pub use throttle::Throttle;
