// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Recovery Sweeper (§4.5): reclaims work left behind by a worker that
//! died without reporting back, and nudges pipelines that got stuck behind
//! a loop step's last story.
//!
//! Every pass runs inside a single [`Store::with_transaction`] call, exactly
//! like the Pipeline Engine: events are collected during the transaction and
//! only dispatched once it has committed.

use std::time::Duration;

use antfarm_core::{
    ActiveSession, Clock, Event, EventKind, RunStatus, SessionKey, Step, StepStatus, Story,
    StoryStatus,
};
use antfarm_events::{Journal, WebhookSink};
use antfarm_pipeline::{PipelineEngine, SpecCache};
use antfarm_storage::{Store, Transaction};

use crate::error::SweeperError;
use crate::report::{ClaimingSweepReport, SessionGcReport, SweepReport};
use crate::throttle::Throttle;

/// Added to an agent's `timeoutSeconds` to get the abandonment threshold
/// for a `running` step (§4.5 pass 1, §5 "Cancellation & timeout").
pub const ABANDONMENT_GRACE: Duration = Duration::from_secs(5 * 60);
/// Passes 1-3 are throttled to at most once per this interval, shared by
/// every caller (the Daemon's own timer and any inline `claimStep`).
pub const GENERAL_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// The Daemon's own cadence for the claiming-rollback pass (§4.5 "a fourth,
/// separate sweep").
pub const CLAIMING_SWEEP_INTERVAL: Duration = Duration::from_secs(2 * 60);
/// How long a row may sit in `claiming` before the rollback pass reverts it.
pub const CLAIMING_STALE_AFTER: Duration = Duration::from_secs(5 * 60);
/// How long an `ActiveSession` may live without its step still running.
pub const SESSION_STALE_AFTER: Duration = Duration::from_secs(60 * 60);
/// Single steps and idle loop steps get this many abandonments before the
/// step (and its run) are failed outright.
pub const MAX_ABANDONMENTS: u32 = 5;

/// The Recovery Sweeper. Long-lived: holds only the clock and the shared
/// throttle gates, never a `Store` reference, so a single instance can be
/// handed to both the Daemon's ticker and the Pipeline Engine's `claimStep`
/// call site (§4.5, §5 "Shared resources").
pub struct Sweeper<C: Clock> {
    clock: C,
    general_throttle: Throttle,
    claiming_throttle: Throttle,
}

impl<C: Clock> Sweeper<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            general_throttle: Throttle::new(GENERAL_SWEEP_INTERVAL),
            claiming_throttle: Throttle::new(CLAIMING_SWEEP_INTERVAL),
        }
    }

    /// Override the throttle windows; used by tests to avoid waiting out
    /// real cadences.
    pub fn with_cadences(mut self, general: Duration, claiming: Duration) -> Self {
        self.general_throttle = Throttle::new(general);
        self.claiming_throttle = Throttle::new(claiming);
        self
    }

    /// Passes 1-3: abandoned `running` steps, abandoned `running` stories
    /// with no owning step, and stuck pipelines. A no-op (returning a
    /// `skipped_throttled` report) if called inside the shared throttle
    /// window.
    pub fn sweep(
        &self,
        store: &mut Store,
        spec_cache: &SpecCache<C>,
        journal: Option<&Journal>,
        max_agent_timeout: Duration,
    ) -> Result<SweepReport, SweeperError> {
        if !self.general_throttle.try_acquire(self.clock.now()) {
            return Ok(SweepReport { skipped_throttled: true, ..Default::default() });
        }

        let now = self.clock.now_iso8601();
        let now_epoch_ms = self.clock.epoch_ms();
        let abandoned_after_ms = (max_agent_timeout + ABANDONMENT_GRACE).as_millis() as u64;

        let (report, events, stuck_runs) = store.with_transaction::<_, SweeperError>(|txn| {
            let mut report = SweepReport::default();
            let mut events = Vec::new();

            sweep_abandoned_steps(txn, spec_cache, &now, now_epoch_ms, abandoned_after_ms, &mut report, &mut events);
            sweep_abandoned_stories(txn, &now, &mut report, &mut events);
            let stuck_runs = stuck_pipeline_runs(txn);

            Ok((report, events, stuck_runs))
        })?;

        for event in events {
            emit(store, journal, event, self.clock.now_iso8601());
        }

        let mut report = report;
        for run_id in stuck_runs {
            let mut engine = PipelineEngine::new(store, self.clock.clone());
            if let Some(journal) = journal {
                engine = engine.with_journal(journal);
            }
            if engine.advance_pipeline(&run_id)?.advanced {
                report.pipelines_advanced += 1;
            }
        }

        Ok(report)
    }

    /// The fourth, separate pass: reverts stale `claiming` rows to
    /// `pending`. Only the Daemon's own 2-minute timer calls this, but it
    /// is throttled the same way in case that ever changes.
    pub fn sweep_claiming(
        &self,
        store: &mut Store,
        journal: Option<&Journal>,
    ) -> Result<ClaimingSweepReport, SweeperError> {
        if !self.claiming_throttle.try_acquire(self.clock.now()) {
            return Ok(ClaimingSweepReport { skipped_throttled: true, ..Default::default() });
        }

        let now = self.clock.now_iso8601();
        let now_epoch_ms = self.clock.epoch_ms();
        let stale_after_ms = CLAIMING_STALE_AFTER.as_millis() as u64;

        let (report, events) = store.with_transaction::<_, SweeperError>(|txn| {
            let mut report = ClaimingSweepReport::default();
            let mut events = Vec::new();

            let claiming_steps: Vec<Step> =
                txn.state().steps_with_status(StepStatus::Claiming).cloned().collect();
            for step in claiming_steps {
                if age_ms(now_epoch_ms, &step.updated_at).unwrap_or(0) < stale_after_ms {
                    continue;
                }
                let mut reverted = step.clone();
                reverted.status = StepStatus::Pending;
                reverted.retry_count += 1;
                reverted.updated_at = now.clone();
                txn.put_step(reverted);
                events.push(Event::new(EventKind::StepRollback, step.run_id).step_id(step.id));
                report.steps_rolled_back += 1;
            }

            let claiming_stories: Vec<Story> =
                txn.state().stories_with_status(StoryStatus::Claiming).cloned().collect();
            for story in claiming_stories {
                if age_ms(now_epoch_ms, &story.updated_at).unwrap_or(0) < stale_after_ms {
                    continue;
                }
                let mut reverted = story.clone();
                reverted.status = StoryStatus::Pending;
                reverted.retry_count += 1;
                reverted.updated_at = now.clone();
                txn.put_story(reverted);
                events.push(Event::new(EventKind::StoryRollback, story.run_id).story_id(story.id));
                report.stories_rolled_back += 1;
            }

            Ok((report, events))
        })?;

        for event in events {
            emit(store, journal, event, self.clock.now_iso8601());
        }
        Ok(report)
    }

    /// Garbage-collects `ActiveSession` rows older than
    /// [`SESSION_STALE_AFTER`] or whose step is no longer `running` (§4.5).
    /// Run on the Daemon's own 10-minute cadence (§4.7); deliberately not
    /// gated by either throttle above since nothing else calls it.
    pub fn gc_active_sessions(&self, store: &mut Store) -> Result<SessionGcReport, SweeperError> {
        let now_epoch_ms = self.clock.epoch_ms();

        store.with_transaction::<_, SweeperError>(|txn| {
            let mut report = SessionGcReport::default();

            let stale: Vec<SessionKey> = txn
                .state()
                .all_active_sessions()
                .filter(|session| is_session_stale(txn.state().step(&session.key.step_id), session, now_epoch_ms))
                .map(|session| session.key.clone())
                .collect();

            for key in stale {
                txn.remove_active_session(&key);
                report.sessions_reclaimed += 1;
            }

            Ok(report)
        })
    }
}

fn is_session_stale(owning_step: Option<&Step>, session: &ActiveSession, now_epoch_ms: u64) -> bool {
    let step_no_longer_running = owning_step.map(|s| s.status != StepStatus::Running).unwrap_or(true);
    let stale_age = age_ms(now_epoch_ms, &session.spawned_at)
        .map(|age| age >= SESSION_STALE_AFTER.as_millis() as u64)
        .unwrap_or(false);
    step_no_longer_running || stale_age
}

fn sweep_abandoned_steps<C: Clock>(
    txn: &mut Transaction,
    spec_cache: &SpecCache<C>,
    now: &str,
    now_epoch_ms: u64,
    abandoned_after_ms: u64,
    report: &mut SweepReport,
    events: &mut Vec<Event>,
) {
    let running_steps: Vec<Step> = txn.state().steps_with_status(StepStatus::Running).cloned().collect();

    for step in running_steps {
        let Some(run) = txn.state().run(&step.run_id).cloned() else { continue };
        if run.status.is_terminal() {
            continue;
        }
        if age_ms(now_epoch_ms, &step.updated_at).unwrap_or(0) < abandoned_after_ms {
            continue;
        }

        if step.is_loop() && step.current_story_id.is_none() {
            let spec = spec_cache.get_spec(&run.workflow_id).ok();
            let awaiting_verify =
                spec.as_deref().map(|spec| loop_awaits_verify(spec, txn, &step)).unwrap_or(false);
            if awaiting_verify {
                continue;
            }
        }

        if let Some(story_id) = step.current_story_id {
            abandon_story(txn, &step, story_id, &run, now, report, events);
        } else {
            abandon_step(txn, &step, &run, now, report, events);
        }
    }
}

fn abandon_story(
    txn: &mut Transaction,
    step: &Step,
    story_id: antfarm_core::StoryId,
    run: &antfarm_core::Run,
    now: &str,
    report: &mut SweepReport,
    events: &mut Vec<Event>,
) {
    if let Some(mut story) = txn.state().story(&story_id).cloned() {
        story.retry_count += 1;
        story.updated_at = now.to_string();

        if story.retry_count > story.max_retries {
            story.status = StoryStatus::Failed;
            txn.put_story(story);

            let mut failed_step = step.clone();
            failed_step.status = StepStatus::Failed;
            failed_step.current_story_id = None;
            failed_step.updated_at = now.to_string();
            txn.put_step(failed_step);

            let mut failed_run = run.clone();
            failed_run.status = RunStatus::Failed;
            failed_run.updated_at = now.to_string();
            txn.put_run(failed_run);

            events.push(Event::new(EventKind::StoryFailed, step.run_id).step_id(step.id).story_id(story_id));
            events.push(Event::new(EventKind::RunFailed, step.run_id));
            report.stories_failed += 1;
            report.steps_failed += 1;
            return;
        }

        story.status = StoryStatus::Pending;
        txn.put_story(story);
    }

    let mut requeued = step.clone();
    requeued.current_story_id = None;
    requeued.status = StepStatus::Pending;
    requeued.updated_at = now.to_string();
    txn.put_step(requeued);

    events.push(Event::new(EventKind::StepTimeout, step.run_id).step_id(step.id));
    report.stories_requeued += 1;
}

fn abandon_step(
    txn: &mut Transaction,
    step: &Step,
    run: &antfarm_core::Run,
    now: &str,
    report: &mut SweepReport,
    events: &mut Vec<Event>,
) {
    let mut updated = step.clone();
    updated.abandoned_count += 1;
    updated.updated_at = now.to_string();

    if updated.abandoned_count > MAX_ABANDONMENTS {
        updated.status = StepStatus::Failed;
        txn.put_step(updated);

        let mut failed_run = run.clone();
        failed_run.status = RunStatus::Failed;
        failed_run.updated_at = now.to_string();
        txn.put_run(failed_run);

        events.push(Event::new(EventKind::StepTimeout, step.run_id).step_id(step.id));
        events.push(Event::new(EventKind::RunFailed, step.run_id));
        report.steps_failed += 1;
        return;
    }

    updated.status = StepStatus::Pending;
    txn.put_step(updated);
    events.push(Event::new(EventKind::StepTimeout, step.run_id).step_id(step.id));
    report.steps_requeued += 1;
}

fn sweep_abandoned_stories(
    txn: &mut Transaction,
    now: &str,
    report: &mut SweepReport,
    events: &mut Vec<Event>,
) {
    let running_stories: Vec<Story> = txn.state().stories_with_status(StoryStatus::Running).cloned().collect();

    for story in running_stories {
        let owned = txn
            .state()
            .steps_for_run(&story.run_id)
            .into_iter()
            .any(|step| step.current_story_id == Some(story.id));
        if owned {
            continue;
        }

        let mut reset = story.clone();
        reset.status = StoryStatus::Pending;
        reset.updated_at = now.to_string();
        txn.put_story(reset);

        events.push(Event::new(EventKind::StoryRollback, story.run_id).story_id(story.id));
        report.stories_requeued += 1;
    }
}

fn stuck_pipeline_runs(txn: &Transaction) -> Vec<antfarm_core::RunId> {
    txn.state()
        .all_runs()
        .filter(|run| !run.status.is_terminal())
        .filter(|run| {
            let steps = txn.state().steps_for_run(&run.id);
            let has_done_loop_step = steps.iter().any(|s| s.is_loop() && s.status == StepStatus::Done);
            let has_runnable = steps.iter().any(|s| {
                matches!(s.status, StepStatus::Pending | StepStatus::Running | StepStatus::Claiming)
            });
            let has_waiting = steps.iter().any(|s| s.status == StepStatus::Waiting);
            has_done_loop_step && !has_runnable && has_waiting
        })
        .map(|run| run.id)
        .collect()
}

fn loop_awaits_verify(
    spec: &antfarm_runbook::WorkflowSpec,
    txn: &Transaction,
    step: &Step,
) -> bool {
    let Some(def) = spec.steps().iter().find(|d| d.id == step.step_id) else { return false };
    let Some(verify_name) = &def.verify_step else { return false };
    txn.state()
        .steps_for_run(&step.run_id)
        .into_iter()
        .any(|s| s.step_id == *verify_name && s.status == StepStatus::Pending)
}

fn age_ms(now_epoch_ms: u64, timestamp: &str) -> Option<u64> {
    let then_ms = chrono::DateTime::parse_from_rfc3339(timestamp).ok()?.timestamp_millis().max(0) as u64;
    Some(now_epoch_ms.saturating_sub(then_ms))
}

fn emit(store: &Store, journal: Option<&Journal>, event: Event, ts: String) {
    let event = event.with_ts(ts);
    if let Some(journal) = journal {
        journal.emit(&event);
    }
    if let Some(run) = store.state().run(&event.run_id) {
        if let Some(notify_url) = &run.notify_url {
            WebhookSink::new(notify_url.clone()).dispatch(event.clone());
        }
    }
}
