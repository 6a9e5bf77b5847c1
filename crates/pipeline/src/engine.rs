// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Pipeline Engine (§4.4): `claimStep`, `claimStory`, `completeStep`,
//! `failStep`, and `advancePipeline`.
//!
//! Every operation runs inside a single [`Store::with_transaction`] call; the
//! events an operation produces are collected during the transaction and
//! only dispatched to the Journal/webhook once the transaction has
//! committed, so a rolled-back mutation never leaves a stray event behind.

use antfarm_core::{
    AgentId, Clock, Event, EventKind, RunId, RunStatus, Step, StepId, StepStatus, Story, StoryId,
    StoryStatus,
};
use antfarm_events::{Journal, WebhookSink};
use antfarm_runbook::{StepDef, StepKind, WorkflowSpec};
use antfarm_storage::{Store, Transaction};

use crate::augment::{FrontendChangeDetector, NullFrontendDetector, NullProgressSource, ProgressSource};
use crate::context::{self, ContextAugmentation, StoryContext};
use crate::error::PipelineError;
use crate::output;
use crate::types::{AdvanceOutcome, ClaimResult, CompleteOutcome, FailOutcome};

pub struct PipelineEngine<'a, C: Clock> {
    store: &'a mut Store,
    clock: C,
    journal: Option<&'a Journal>,
    frontend_detector: Box<dyn FrontendChangeDetector>,
    progress_source: Box<dyn ProgressSource>,
}

impl<'a, C: Clock> PipelineEngine<'a, C> {
    pub fn new(store: &'a mut Store, clock: C) -> Self {
        Self {
            store,
            clock,
            journal: None,
            frontend_detector: Box::new(NullFrontendDetector),
            progress_source: Box::new(NullProgressSource),
        }
    }

    pub fn with_journal(mut self, journal: &'a Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_frontend_detector(mut self, detector: impl FrontendChangeDetector + 'static) -> Self {
        self.frontend_detector = Box::new(detector);
        self
    }

    pub fn with_progress_source(mut self, source: impl ProgressSource + 'static) -> Self {
        self.progress_source = Box::new(source);
        self
    }

    /// Stamp `event` with the current time, hand it to the Journal, and —
    /// if the run it belongs to carries a `notify_url` — fire an ad hoc
    /// webhook dispatch at that URL too. Both sinks are best-effort.
    fn emit(&self, event: Event) {
        let event = event.with_ts(self.clock.now_iso8601());
        if let Some(journal) = self.journal {
            journal.emit(&event);
        }
        if let Some(run) = self.store.state().run(&event.run_id) {
            if let Some(notify_url) = &run.notify_url {
                WebhookSink::new(notify_url.clone()).dispatch(event.clone());
            }
        }
    }

    pub fn claim_step(&mut self, agent_id: &AgentId) -> Result<Option<ClaimResult>, PipelineError> {
        let now = self.clock.now_iso8601();
        let frontend = self.frontend_detector.as_ref();
        let progress_source = self.progress_source.as_ref();

        let (result, events) = self.store.with_transaction::<_, PipelineError>(|txn| {
            let mut candidates: Vec<Step> = txn
                .state()
                .steps_for_agent(agent_id)
                .filter(|s| s.status == StepStatus::Pending && !s.is_loop())
                .filter(|s| {
                    txn.state()
                        .run(&s.run_id)
                        .map(|r| !matches!(r.status, RunStatus::Failed | RunStatus::Cancelled))
                        .unwrap_or(false)
                })
                .cloned()
                .collect();
            candidates.sort_by_key(|s| (s.run_id.to_string(), s.step_index));

            let Some(step) = candidates.into_iter().next() else {
                return Ok((None, Vec::new()));
            };

            let run = txn
                .state()
                .run(&step.run_id)
                .cloned()
                .ok_or_else(|| PipelineError::RunNotFound(step.run_id.to_string()))?;
            if run.status.is_terminal() {
                return Ok((None, Vec::new()));
            }

            let mut input_context = run.context.clone();
            let augmentation = ContextAugmentation {
                run_id: run.id.to_string(),
                has_frontend_changes: match (input_context.get("repo"), input_context.get("branch")) {
                    (Some(repo), Some(branch)) => frontend.has_frontend_changes(repo, branch),
                    _ => None,
                },
                progress: progress_source.read_progress(&run.id.to_string()),
            };
            augmentation.apply(&mut input_context);
            let resolved_input = context::interpolate(&step.input_template, &input_context);

            let mut claimed = step.clone();
            claimed.status = StepStatus::Claiming;
            claimed.updated_at = now.clone();
            txn.put_step(claimed.clone());

            let claim = ClaimResult {
                run_id: claimed.run_id,
                step_id: claimed.id,
                story_id: None,
                agent_id: claimed.agent_id,
                resolved_input,
            };
            let events = vec![Event::new(EventKind::StepClaimed, claimed.run_id)
                .step_id(claimed.id)
                .agent_id(claimed.agent_id)];

            Ok((Some(claim), events))
        })?;

        for event in events {
            self.emit(event);
        }
        Ok(result)
    }

    pub fn claim_story(
        &mut self,
        loop_step_id: &StepId,
        spec: &WorkflowSpec,
    ) -> Result<Option<ClaimResult>, PipelineError> {
        let now = self.clock.now_iso8601();
        let progress_source = self.progress_source.as_ref();

        struct Outcome {
            claim: Option<ClaimResult>,
            run_id: RunId,
            advance_needed: bool,
        }

        let (outcome, events) = self.store.with_transaction::<_, PipelineError>(|txn| {
            let step = txn
                .state()
                .step(loop_step_id)
                .cloned()
                .ok_or_else(|| PipelineError::StepNotFound(loop_step_id.to_string()))?;
            if !step.is_loop() {
                return Ok((Outcome { claim: None, run_id: step.run_id, advance_needed: false }, Vec::new()));
            }

            let run = txn
                .state()
                .run(&step.run_id)
                .cloned()
                .ok_or_else(|| PipelineError::RunNotFound(step.run_id.to_string()))?;
            if run.status.is_terminal() {
                return Ok((Outcome { claim: None, run_id: step.run_id, advance_needed: false }, Vec::new()));
            }

            let stories: Vec<Story> = txn.state().stories_for_run(&step.run_id).into_iter().cloned().collect();
            let pending = stories
                .iter()
                .filter(|s| s.status == StoryStatus::Pending)
                .min_by_key(|s| s.story_index)
                .cloned();

            let Some(story) = pending else {
                let (loop_outcome, events) = conclude_loop(txn, &step, spec, &now);
                let advance_needed = matches!(loop_outcome, LoopOutcome::Completed);
                return Ok((Outcome { claim: None, run_id: step.run_id, advance_needed }, events));
            };

            let mut claimed_story = story.clone();
            claimed_story.status = StoryStatus::Claiming;
            claimed_story.updated_at = now.clone();
            txn.put_story(claimed_story.clone());

            let mut claimed_step = step.clone();
            claimed_step.current_story_id = Some(claimed_story.id);
            claimed_step.updated_at = now.clone();
            txn.put_step(claimed_step.clone());

            let completed_stories: Vec<String> = stories
                .iter()
                .filter(|s| s.status == StoryStatus::Done)
                .map(|s| s.story_id.clone())
                .collect();
            let stories_remaining = stories
                .iter()
                .filter(|s| matches!(s.status, StoryStatus::Pending | StoryStatus::Claiming))
                .count() as u32;

            let mut context_map = run.context.clone();
            let existing_feedback = context_map.get("verify_feedback").cloned();
            let story_context = StoryContext {
                current_story: claimed_story.description.clone(),
                current_story_id: claimed_story.story_id.clone(),
                current_story_title: claimed_story.title.clone(),
                completed_stories,
                stories_remaining,
                progress: progress_source.read_progress(&run.id.to_string()),
                verify_feedback: existing_feedback,
            };
            story_context.apply(&mut context_map);
            let resolved_input = context::interpolate(&claimed_step.input_template, &context_map);

            let mut updated_run = run.clone();
            updated_run.context = context_map;
            updated_run.updated_at = now.clone();
            txn.put_run(updated_run);

            let claim = ClaimResult {
                run_id: claimed_step.run_id,
                step_id: claimed_step.id,
                story_id: Some(claimed_story.id),
                agent_id: claimed_step.agent_id,
                resolved_input,
            };
            let events = vec![Event::new(EventKind::StoryClaimed, claimed_step.run_id)
                .step_id(claimed_step.id)
                .story_id(claimed_story.id)
                .agent_id(claimed_step.agent_id)];

            Ok((Outcome { claim: Some(claim), run_id: step.run_id, advance_needed: false }, events))
        })?;

        for event in events {
            self.emit(event);
        }
        if outcome.advance_needed {
            self.advance_pipeline(&outcome.run_id)?;
        }
        Ok(outcome.claim)
    }

    pub fn complete_step(
        &mut self,
        step_id: &StepId,
        output: &str,
        spec: &WorkflowSpec,
    ) -> Result<CompleteOutcome, PipelineError> {
        let now = self.clock.now_iso8601();

        struct Outcome {
            outcome: CompleteOutcome,
            run_id: RunId,
            advance_needed: bool,
        }

        let (result, events) = self.store.with_transaction::<_, PipelineError>(|txn| {
            let step = txn
                .state()
                .step(step_id)
                .cloned()
                .ok_or_else(|| PipelineError::StepNotFound(step_id.to_string()))?;
            let run = txn
                .state()
                .run(&step.run_id)
                .cloned()
                .ok_or_else(|| PipelineError::RunNotFound(step.run_id.to_string()))?;

            if matches!(run.status, RunStatus::Failed | RunStatus::Cancelled) {
                return Ok((
                    Outcome { outcome: CompleteOutcome::default(), run_id: run.id, advance_needed: false },
                    Vec::new(),
                ));
            }

            let parsed = output::parse(output);
            let ingested = match &parsed.stories_json {
                Some(raw) => Some(output::parse_stories_json(raw)?),
                None => None,
            };

            let mut context_map = run.context.clone();
            for (key, value) in &parsed.fields {
                context_map.insert(key.clone(), value.clone());
            }
            let mut updated_run = run.clone();
            updated_run.context = context_map;
            updated_run.updated_at = now.clone();
            txn.put_run(updated_run);

            if let Some(entries) = ingested {
                let existing_ids: std::collections::HashSet<String> =
                    txn.state().stories_for_run(&step.run_id).iter().map(|s| s.story_id.clone()).collect();
                let existing_count = existing_ids.len();
                let new_entries: Vec<_> = entries.into_iter().filter(|e| !existing_ids.contains(&e.id)).collect();

                if existing_count + new_entries.len() > antfarm_core::story::MAX_STORIES {
                    return Err(PipelineError::InvalidStoriesJson(format!(
                        "ingesting {} new stories would bring run {} to {} total, over the cap of {}",
                        new_entries.len(),
                        step.run_id,
                        existing_count + new_entries.len(),
                        antfarm_core::story::MAX_STORIES,
                    )));
                }

                let mut next_index = existing_count as u32;
                for entry in new_entries {
                    let story = Story {
                        id: StoryId::new(),
                        run_id: step.run_id,
                        story_index: next_index,
                        story_id: entry.id,
                        title: entry.title,
                        description: entry.description,
                        acceptance_criteria: entry.acceptance_criteria,
                        status: StoryStatus::Pending,
                        output: None,
                        retry_count: 0,
                        max_retries: antfarm_core::story::DEFAULT_STORY_MAX_RETRIES,
                        created_at: now.clone(),
                        updated_at: now.clone(),
                    };
                    txn.put_story(story);
                    next_index += 1;
                }
            }

            let mut events = Vec::new();

            // The step is a loop step finishing its current story.
            if step.is_loop() && step.current_story_id.is_some() {
                let story_id = step.current_story_id.expect("checked above");
                if let Some(mut story) = txn.state().story(&story_id).cloned() {
                    story.status = StoryStatus::Done;
                    story.output = Some(output.to_string());
                    story.updated_at = now.clone();
                    txn.put_story(story);
                    events.push(
                        Event::new(EventKind::StoryDone, step.run_id).step_id(step.id).story_id(story_id),
                    );
                }

                let mut running_step = step.clone();
                running_step.current_story_id = None;
                running_step.output = Some(output.to_string());
                running_step.status = StepStatus::Running;
                running_step.updated_at = now.clone();

                let def = step_def_by_human_id(spec, &step.step_id);
                let verify_each = step.loop_config.map(|c| c.verify_each).unwrap_or(false);
                let verify_step_name = def.and_then(|d| d.verify_step.clone());

                if verify_each {
                    if let Some(verify_name) = verify_step_name {
                        if let Some(mut verify_row) = txn
                            .state()
                            .steps_for_run(&step.run_id)
                            .into_iter()
                            .find(|s| s.step_id == verify_name)
                            .cloned()
                        {
                            verify_row.status = StepStatus::Pending;
                            verify_row.updated_at = now.clone();
                            events.push(Event::new(EventKind::StepPending, step.run_id).step_id(verify_row.id));
                            txn.put_step(verify_row);
                        }
                        txn.put_step(running_step);
                        return Ok((
                            Outcome { outcome: CompleteOutcome::default(), run_id: step.run_id, advance_needed: false },
                            events,
                        ));
                    }
                }

                txn.put_step(running_step.clone());
                let (loop_outcome, mut loop_events) = conclude_loop(txn, &running_step, spec, &now);
                events.append(&mut loop_events);
                let advance_needed = matches!(loop_outcome, LoopOutcome::Completed);
                return Ok((
                    Outcome { outcome: CompleteOutcome::default(), run_id: step.run_id, advance_needed },
                    events,
                ));
            }

            // The step is the configured verify step for some loop.
            if let Some(loop_step_human_id) = find_loop_step_verified_by(spec, &step.step_id) {
                let loop_step = txn
                    .state()
                    .steps_for_run(&step.run_id)
                    .into_iter()
                    .find(|s| s.step_id == loop_step_human_id)
                    .cloned()
                    .ok_or_else(|| PipelineError::StepNotFound(loop_step_human_id.clone()))?;

                let mut reset_verify = step.clone();
                reset_verify.status = StepStatus::Waiting;
                reset_verify.output = Some(output.to_string());
                reset_verify.updated_at = now.clone();
                txn.put_step(reset_verify);

                let is_retry = parsed.get("status").map(str::to_ascii_lowercase).as_deref() == Some("retry");

                if is_retry {
                    let most_recent_done = txn
                        .state()
                        .stories_for_run(&step.run_id)
                        .into_iter()
                        .filter(|s| s.status == StoryStatus::Done)
                        .max_by_key(|s| s.updated_at.clone())
                        .cloned();

                    let Some(mut story) = most_recent_done else {
                        return Ok((
                            Outcome { outcome: CompleteOutcome::default(), run_id: step.run_id, advance_needed: false },
                            events,
                        ));
                    };
                    story.retry_count += 1;

                    if story.retry_count > story.max_retries {
                        let story_id = story.id;
                        story.status = StoryStatus::Failed;
                        story.updated_at = now.clone();
                        txn.put_story(story);

                        let mut failed_loop = loop_step.clone();
                        failed_loop.status = StepStatus::Failed;
                        failed_loop.updated_at = now.clone();
                        txn.put_step(failed_loop);

                        let mut failed_run = txn
                            .state()
                            .run(&step.run_id)
                            .cloned()
                            .ok_or_else(|| PipelineError::RunNotFound(step.run_id.to_string()))?;
                        failed_run.status = RunStatus::Failed;
                        failed_run.updated_at = now.clone();
                        txn.put_run(failed_run);

                        events.push(Event::new(EventKind::StoryFailed, step.run_id).story_id(story_id));
                        events.push(Event::new(EventKind::RunFailed, step.run_id));
                        return Ok((
                            Outcome { outcome: CompleteOutcome::default(), run_id: step.run_id, advance_needed: false },
                            events,
                        ));
                    }

                    let story_id = story.id;
                    story.status = StoryStatus::Pending;
                    story.updated_at = now.clone();
                    txn.put_story(story);

                    let feedback =
                        parsed.get("issues").map(str::to_string).unwrap_or_else(|| output.to_string());
                    let mut run_with_feedback = txn
                        .state()
                        .run(&step.run_id)
                        .cloned()
                        .ok_or_else(|| PipelineError::RunNotFound(step.run_id.to_string()))?;
                    run_with_feedback.context.insert("verify_feedback".to_string(), feedback);
                    run_with_feedback.updated_at = now.clone();
                    txn.put_run(run_with_feedback);

                    let mut requeued_loop = loop_step.clone();
                    requeued_loop.status = StepStatus::Pending;
                    requeued_loop.updated_at = now.clone();
                    txn.put_step(requeued_loop);

                    events.push(Event::new(EventKind::StoryRetry, step.run_id).story_id(story_id));
                    return Ok((
                        Outcome { outcome: CompleteOutcome::default(), run_id: step.run_id, advance_needed: false },
                        events,
                    ));
                }

                events.push(Event::new(EventKind::StoryVerified, step.run_id));
                let mut run_clear = txn
                    .state()
                    .run(&step.run_id)
                    .cloned()
                    .ok_or_else(|| PipelineError::RunNotFound(step.run_id.to_string()))?;
                run_clear.context.remove("verify_feedback");
                run_clear.updated_at = now.clone();
                txn.put_run(run_clear);

                let (loop_outcome, mut loop_events) = conclude_loop(txn, &loop_step, spec, &now);
                events.append(&mut loop_events);
                let advance_needed = matches!(loop_outcome, LoopOutcome::Completed);
                return Ok((
                    Outcome { outcome: CompleteOutcome::default(), run_id: step.run_id, advance_needed },
                    events,
                ));
            }

            // Plain single-step completion.
            let mut done_step = step.clone();
            done_step.status = StepStatus::Done;
            done_step.output = Some(output.to_string());
            done_step.updated_at = now.clone();
            txn.put_step(done_step);
            events.push(Event::new(EventKind::StepDone, step.run_id).step_id(step.id));

            Ok((Outcome { outcome: CompleteOutcome::default(), run_id: step.run_id, advance_needed: true }, events))
        })?;

        for event in events {
            self.emit(event);
        }

        if result.advance_needed {
            let advance = self.advance_pipeline(&result.run_id)?;
            Ok(CompleteOutcome { advanced: advance.advanced, run_completed: advance.run_completed })
        } else {
            Ok(result.outcome)
        }
    }

    pub fn fail_step(&mut self, step_id: &StepId, error: &str) -> Result<FailOutcome, PipelineError> {
        let now = self.clock.now_iso8601();

        let (outcome, events) = self.store.with_transaction::<_, PipelineError>(|txn| {
            let step = txn
                .state()
                .step(step_id)
                .cloned()
                .ok_or_else(|| PipelineError::StepNotFound(step_id.to_string()))?;
            let run = txn
                .state()
                .run(&step.run_id)
                .cloned()
                .ok_or_else(|| PipelineError::RunNotFound(step.run_id.to_string()))?;

            if run.status.is_terminal() {
                return Ok((FailOutcome::default(), Vec::new()));
            }

            let mut events = Vec::new();

            if step.is_loop() {
                if let Some(story_id) = step.current_story_id {
                    if let Some(mut story) = txn.state().story(&story_id).cloned() {
                        story.retry_count += 1;
                        story.updated_at = now.clone();

                        if story.retry_count > story.max_retries {
                            story.status = StoryStatus::Failed;
                            txn.put_story(story);

                            let mut failed_step = step.clone();
                            failed_step.status = StepStatus::Failed;
                            failed_step.updated_at = now.clone();
                            txn.put_step(failed_step);

                            let mut failed_run = run.clone();
                            failed_run.status = RunStatus::Failed;
                            failed_run.updated_at = now.clone();
                            txn.put_run(failed_run);

                            events.push(
                                Event::new(EventKind::StoryFailed, step.run_id)
                                    .story_id(story_id)
                                    .detail(error.to_string()),
                            );
                            events.push(Event::new(EventKind::RunFailed, step.run_id));
                            return Ok((FailOutcome { retrying: false, run_failed: true }, events));
                        }

                        story.status = StoryStatus::Pending;
                        txn.put_story(story);
                    }

                    let mut requeued = step.clone();
                    requeued.current_story_id = None;
                    requeued.status = StepStatus::Pending;
                    requeued.updated_at = now.clone();
                    txn.put_step(requeued);

                    events.push(
                        Event::new(EventKind::StoryFailed, step.run_id)
                            .story_id(story_id)
                            .detail(error.to_string()),
                    );
                    return Ok((FailOutcome { retrying: true, run_failed: false }, events));
                }
            }

            let mut updated = step.clone();
            updated.retry_count += 1;
            updated.updated_at = now.clone();

            if updated.retry_count > updated.max_retries {
                updated.status = StepStatus::Failed;
                updated.output = Some(error.to_string());
                txn.put_step(updated);

                let mut failed_run = run.clone();
                failed_run.status = RunStatus::Failed;
                failed_run.updated_at = now.clone();
                txn.put_run(failed_run);

                events.push(
                    Event::new(EventKind::StepFailed, step.run_id).step_id(step.id).detail(error.to_string()),
                );
                events.push(Event::new(EventKind::RunFailed, step.run_id));
                return Ok((FailOutcome { retrying: false, run_failed: true }, events));
            }

            updated.status = StepStatus::Pending;
            txn.put_step(updated);
            events
                .push(Event::new(EventKind::StepFailed, step.run_id).step_id(step.id).detail(error.to_string()));
            Ok((FailOutcome { retrying: true, run_failed: false }, events))
        })?;

        for event in events {
            self.emit(event);
        }
        Ok(outcome)
    }

    pub fn advance_pipeline(&mut self, run_id: &RunId) -> Result<AdvanceOutcome, PipelineError> {
        let now = self.clock.now_iso8601();

        let (outcome, events) = self.store.with_transaction::<_, PipelineError>(|txn| {
            let run = txn
                .state()
                .run(run_id)
                .cloned()
                .ok_or_else(|| PipelineError::RunNotFound(run_id.to_string()))?;
            if run.status.is_terminal() {
                return Ok((AdvanceOutcome::default(), Vec::new()));
            }

            let steps = txn.state().steps_for_run(run_id);
            let waiting = steps.iter().find(|s| s.status == StepStatus::Waiting).cloned();

            let Some(waiting_step) = waiting else {
                let incomplete = steps.iter().any(|s| {
                    matches!(
                        s.status,
                        StepStatus::Pending | StepStatus::Running | StepStatus::Failed | StepStatus::Claiming
                    )
                });
                if incomplete {
                    return Ok((AdvanceOutcome::default(), Vec::new()));
                }

                let mut completed = run.clone();
                completed.status = RunStatus::Completed;
                completed.updated_at = now.clone();
                txn.put_run(completed);
                let events = vec![Event::new(EventKind::RunCompleted, *run_id)];
                return Ok((AdvanceOutcome { advanced: false, run_completed: true }, events));
            };

            let incomplete_before = steps.iter().any(|s| {
                s.step_index < waiting_step.step_index
                    && matches!(
                        s.status,
                        StepStatus::Pending | StepStatus::Running | StepStatus::Failed | StepStatus::Claiming
                    )
            });
            if incomplete_before {
                return Ok((AdvanceOutcome::default(), Vec::new()));
            }

            let mut next_step = waiting_step.clone();
            next_step.status = StepStatus::Pending;
            next_step.updated_at = now.clone();
            txn.put_step(next_step.clone());

            let events = vec![
                Event::new(EventKind::PipelineAdvanced, *run_id).step_id(next_step.id),
                Event::new(EventKind::StepPending, *run_id).step_id(next_step.id),
            ];
            Ok((AdvanceOutcome { advanced: true, run_completed: false }, events))
        })?;

        for event in events {
            self.emit(event);
        }
        if outcome.run_completed {
            self.progress_source.archive(&run_id.to_string());
        }
        Ok(outcome)
    }
}

enum LoopOutcome {
    Requeued,
    Failed,
    Completed,
}

/// Shared by `claimStory`'s "no pending story" branch and `completeStep`'s
/// loop-continuation check (§4.4): decides whether the loop step re-queues
/// for its next story, fails along with the run, or is done — in which case
/// its configured verify step (if any) is marked done too.
fn conclude_loop(
    txn: &mut Transaction,
    loop_step: &Step,
    spec: &WorkflowSpec,
    now: &str,
) -> (LoopOutcome, Vec<Event>) {
    let stories: Vec<Story> = txn.state().stories_for_run(&loop_step.run_id).into_iter().cloned().collect();
    let any_pending = stories.iter().any(|s| s.status == StoryStatus::Pending);
    let any_failed = stories.iter().any(|s| s.status == StoryStatus::Failed);
    let mut events = Vec::new();

    if any_pending {
        let mut step = loop_step.clone();
        step.status = StepStatus::Pending;
        step.updated_at = now.to_string();
        txn.put_step(step);
        return (LoopOutcome::Requeued, events);
    }

    if any_failed {
        let mut step = loop_step.clone();
        step.status = StepStatus::Failed;
        step.updated_at = now.to_string();
        txn.put_step(step);

        if let Some(mut run) = txn.state().run(&loop_step.run_id).cloned() {
            run.status = RunStatus::Failed;
            run.updated_at = now.to_string();
            txn.put_run(run);
        }
        events.push(Event::new(EventKind::RunFailed, loop_step.run_id).step_id(loop_step.id));
        return (LoopOutcome::Failed, events);
    }

    let mut step = loop_step.clone();
    step.status = StepStatus::Done;
    step.updated_at = now.to_string();
    txn.put_step(step);
    events.push(Event::new(EventKind::StepDone, loop_step.run_id).step_id(loop_step.id));

    if let Some(def) = step_def_by_human_id(spec, &loop_step.step_id) {
        if let Some(verify_name) = &def.verify_step {
            if let Some(mut verify_row) = txn
                .state()
                .steps_for_run(&loop_step.run_id)
                .into_iter()
                .find(|s| s.step_id == *verify_name)
                .cloned()
            {
                verify_row.status = StepStatus::Done;
                verify_row.updated_at = now.to_string();
                txn.put_step(verify_row);
            }
        }
    }

    (LoopOutcome::Completed, events)
}

fn step_def_by_human_id<'s>(spec: &'s WorkflowSpec, human_id: &str) -> Option<&'s StepDef> {
    spec.steps().iter().find(|s| s.id == human_id)
}

/// The human id of the loop step that names `verify_step_human_id` as its
/// `verifyStep`, if any.
fn find_loop_step_verified_by(spec: &WorkflowSpec, verify_step_human_id: &str) -> Option<String> {
    spec.steps()
        .iter()
        .find(|s| matches!(s.kind, StepKind::Loop) && s.verify_step.as_deref() == Some(verify_step_human_id))
        .map(|s| s.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use antfarm_core::step::StepBuilder;
    use antfarm_core::story::StoryBuilder;
    use antfarm_core::{FakeClock, LoopConfig, Scheduler, StepType};
    use antfarm_storage::Store;
    use tempfile::tempdir;

    fn open_store() -> (tempfile::TempDir, Store) {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("store.wal")).unwrap();
        (dir, store)
    }

    const SINGLE_STEP_SPEC: &str = r#"
        [workflow]
        id = "wf"
        name = "Workflow"

        [[agents]]
        id = "a1"
        name = "builder"

        [[steps]]
        id = "design"
        index = 0
        agent = "a1"
        input = "design {{task}}"
    "#;

    const LOOP_SPEC: &str = r#"
        [workflow]
        id = "wf"
        name = "Workflow"

        [[agents]]
        id = "a1"
        name = "builder"

        [[steps]]
        id = "plan"
        index = 0
        agent = "a1"
        input = "plan {{task}}"

        [[steps]]
        id = "implement"
        index = 1
        agent = "a1"
        input = "implement {{current_story}}"
        type = "loop"
        verify_step = "verify"

        [steps.loop]
        verify_each = true

        [[steps]]
        id = "verify"
        index = 2
        agent = "a1"
        input = "verify {{current_story}}"
    "#;

    fn agent() -> AgentId {
        AgentId::from_string("a1")
    }

    /// `run_id`/`agent_id` are `computed` builder fields (no setter), so
    /// every row is built with its own random defaults and then rehomed
    /// onto the shared run/agent by direct field assignment.
    fn step_for(run_id: RunId, build: impl FnOnce(StepBuilder) -> StepBuilder) -> Step {
        let mut step = build(Step::builder()).build();
        step.run_id = run_id;
        step.agent_id = agent();
        step
    }

    fn story_for(run_id: RunId, build: impl FnOnce(StoryBuilder) -> StoryBuilder) -> Story {
        let mut story = build(Story::builder()).build();
        story.run_id = run_id;
        story
    }

    fn engine_step_status<C: Clock>(engine: &PipelineEngine<C>, step_id: &StepId) -> StepStatus {
        engine.store.state().step(step_id).unwrap().status
    }

    #[test]
    fn claim_step_resolves_input_and_transitions_to_claiming() {
        let (_dir, mut store) = open_store();
        let mut run = antfarm_core::Run::builder().task("do the thing").scheduler(Scheduler::Daemon).build();
        run.context.insert("task".to_string(), "fix bug".to_string());
        let step = step_for(run.id, |b| {
            b.step_id("design").step_index(0).input_template("design {{task}}").kind(StepType::Single).status(
                StepStatus::Pending,
            )
        });
        store
            .with_transaction::<_, PipelineError>(|txn| {
                txn.put_run(run.clone());
                txn.insert_step(step.clone())?;
                Ok(())
            })
            .unwrap();

        let mut engine = PipelineEngine::new(&mut store, FakeClock::new());
        let claim = engine.claim_step(&agent()).unwrap().expect("a pending step exists");

        assert_eq!(claim.resolved_input, "design fix bug");
        assert_eq!(engine_step_status(&engine, &claim.step_id), StepStatus::Claiming);
    }

    #[test]
    fn claim_step_skips_steps_of_a_failed_run() {
        let (_dir, mut store) = open_store();
        let run = antfarm_core::Run::builder().status(RunStatus::Failed).build();
        let step = step_for(run.id, |b| b.step_index(0).status(StepStatus::Pending).kind(StepType::Single));
        store
            .with_transaction::<_, PipelineError>(|txn| {
                txn.put_run(run);
                txn.insert_step(step)?;
                Ok(())
            })
            .unwrap();

        let mut engine = PipelineEngine::new(&mut store, FakeClock::new());
        assert!(engine.claim_step(&agent()).unwrap().is_none());
    }

    #[test]
    fn advance_pipeline_promotes_next_waiting_step_then_completes_run() {
        let (_dir, mut store) = open_store();
        let run = antfarm_core::Run::builder().scheduler(Scheduler::Daemon).build();
        let first = step_for(run.id, |b| {
            b.step_id("design").step_index(0).status(StepStatus::Done).kind(StepType::Single)
        });
        let second = step_for(run.id, |b| {
            b.step_id("build").step_index(1).status(StepStatus::Waiting).kind(StepType::Single)
        });
        store
            .with_transaction::<_, PipelineError>(|txn| {
                txn.put_run(run.clone());
                txn.insert_step(first)?;
                txn.insert_step(second.clone())?;
                Ok(())
            })
            .unwrap();

        let mut engine = PipelineEngine::new(&mut store, FakeClock::new());
        let outcome = engine.advance_pipeline(&run.id).unwrap();
        assert!(outcome.advanced);
        assert!(!outcome.run_completed);
        assert_eq!(engine_step_status(&engine, &second.id), StepStatus::Pending);

        // Finish the promoted step; the run should now complete.
        store
            .with_transaction::<_, PipelineError>(|txn| {
                let mut done = txn.state().step(&second.id).unwrap().clone();
                done.status = StepStatus::Done;
                txn.put_step(done);
                Ok(())
            })
            .unwrap();
        let mut engine = PipelineEngine::new(&mut store, FakeClock::new());
        let outcome = engine.advance_pipeline(&run.id).unwrap();
        assert!(outcome.run_completed);
        assert_eq!(engine.store.state().run(&run.id).unwrap().status, RunStatus::Completed);
    }

    #[test]
    fn complete_step_on_cancelled_run_is_a_no_op() {
        let (_dir, mut store) = open_store();
        let run = antfarm_core::Run::builder().status(RunStatus::Cancelled).build();
        let step = step_for(run.id, |b| {
            b.step_id("design").status(StepStatus::Running).kind(StepType::Single)
        });
        let step_id = step.id;
        store
            .with_transaction::<_, PipelineError>(|txn| {
                txn.put_run(run);
                txn.insert_step(step)?;
                Ok(())
            })
            .unwrap();

        let spec = WorkflowSpec::parse(SINGLE_STEP_SPEC.as_bytes(), "test").unwrap();
        let mut engine = PipelineEngine::new(&mut store, FakeClock::new());
        let outcome = engine.complete_step(&step_id, "STATUS: done", &spec).unwrap();
        assert_eq!(outcome, CompleteOutcome::default());
        assert_eq!(engine_step_status(&engine, &step_id), StepStatus::Running);
    }

    #[test]
    fn complete_step_ingests_stories_and_advances_single_step() {
        let (_dir, mut store) = open_store();
        let run = antfarm_core::Run::builder().scheduler(Scheduler::Daemon).build();
        let plan = step_for(run.id, |b| {
            b.step_id("plan").step_index(0).status(StepStatus::Running).kind(StepType::Single)
        });
        let implement = step_for(run.id, |b| {
            b.step_id("implement")
                .step_index(1)
                .status(StepStatus::Waiting)
                .kind(StepType::Loop)
                .loop_config(LoopConfig { verify_each: true })
        });
        store
            .with_transaction::<_, PipelineError>(|txn| {
                txn.put_run(run.clone());
                txn.insert_step(plan.clone())?;
                txn.insert_step(implement)?;
                Ok(())
            })
            .unwrap();

        let spec = WorkflowSpec::parse(LOOP_SPEC.as_bytes(), "test").unwrap();
        let mut engine = PipelineEngine::new(&mut store, FakeClock::new());
        let output = r#"STATUS: done
STORIES_JSON: [{"id":"s1","title":"T1","description":"D1","acceptanceCriteria":["works"]}]"#;
        let outcome = engine.complete_step(&plan.id, output, &spec).unwrap();

        assert!(outcome.advanced);
        let stories = engine.store.state().stories_for_run(&run.id);
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].story_id, "s1");
    }

    #[test]
    fn verify_each_retry_requeues_story_and_loop_step() {
        let (_dir, mut store) = open_store();
        let run = antfarm_core::Run::builder().scheduler(Scheduler::Daemon).build();
        let implement = step_for(run.id, |b| {
            b.step_id("implement")
                .step_index(1)
                .status(StepStatus::Running)
                .kind(StepType::Loop)
                .loop_config(LoopConfig { verify_each: true })
        });
        let verify = step_for(run.id, |b| {
            b.step_id("verify").step_index(2).status(StepStatus::Running).kind(StepType::Single)
        });
        let story = story_for(run.id, |b| {
            b.story_index(0).story_id("s1").status(StoryStatus::Done).updated_at("2024-01-01T00:00:01Z")
        });
        let verify_id = verify.id;
        store
            .with_transaction::<_, PipelineError>(|txn| {
                txn.put_run(run.clone());
                txn.insert_step(implement)?;
                txn.insert_step(verify)?;
                txn.put_story(story);
                Ok(())
            })
            .unwrap();

        let spec = WorkflowSpec::parse(LOOP_SPEC.as_bytes(), "test").unwrap();
        let mut engine = PipelineEngine::new(&mut store, FakeClock::new());
        let outcome = engine
            .complete_step(&verify_id, "STATUS: retry\nISSUES: missing test", &spec)
            .unwrap();
        assert_eq!(outcome, CompleteOutcome::default());

        let stories = engine.store.state().stories_for_run(&run.id);
        assert_eq!(stories[0].status, StoryStatus::Pending);
        assert_eq!(stories[0].retry_count, 1);
        let run_row = engine.store.state().run(&run.id).unwrap();
        assert_eq!(run_row.context.get("verify_feedback").map(String::as_str), Some("missing test"));
    }

    #[test]
    fn fail_step_retries_then_fails_run_once_budget_exhausted() {
        let (_dir, mut store) = open_store();
        let run = antfarm_core::Run::builder().scheduler(Scheduler::Daemon).build();
        let step = step_for(run.id, |b| b.status(StepStatus::Running).kind(StepType::Single).max_retries(1));
        let step_id = step.id;
        store
            .with_transaction::<_, PipelineError>(|txn| {
                txn.put_run(run.clone());
                txn.insert_step(step)?;
                Ok(())
            })
            .unwrap();

        let mut engine = PipelineEngine::new(&mut store, FakeClock::new());
        let first = engine.fail_step(&step_id, "boom").unwrap();
        assert!(first.retrying);
        assert_eq!(engine_step_status(&engine, &step_id), StepStatus::Pending);

        let second = engine.fail_step(&step_id, "boom again").unwrap();
        assert!(second.run_failed);
        assert_eq!(engine_step_status(&engine, &step_id), StepStatus::Failed);
        assert_eq!(engine.store.state().run(&run.id).unwrap().status, RunStatus::Failed);
    }

    #[test]
    fn claim_story_picks_lowest_pending_index_and_materializes_story_context() {
        let (_dir, mut store) = open_store();
        let run = antfarm_core::Run::builder().scheduler(Scheduler::Daemon).build();
        let implement = step_for(run.id, |b| {
            b.step_id("implement")
                .step_index(1)
                .status(StepStatus::Running)
                .kind(StepType::Loop)
                .input_template("implement {{current_story}}")
        });
        let implement_id = implement.id;
        let s1 = story_for(run.id, |b| {
            b.story_index(0).story_id("s1").title("Story One").description("do story one").status(
                StoryStatus::Pending,
            )
        });
        let s2 = story_for(run.id, |b| b.story_index(1).story_id("s2").status(StoryStatus::Pending));
        store
            .with_transaction::<_, PipelineError>(|txn| {
                txn.put_run(run.clone());
                txn.insert_step(implement)?;
                txn.put_story(s1);
                txn.put_story(s2);
                Ok(())
            })
            .unwrap();

        let spec = WorkflowSpec::parse(LOOP_SPEC.as_bytes(), "test").unwrap();
        let mut engine = PipelineEngine::new(&mut store, FakeClock::new());
        let claim = engine.claim_story(&implement_id, &spec).unwrap().expect("a pending story exists");

        assert_eq!(claim.resolved_input, "implement do story one");
        let stories = engine.store.state().stories_for_run(&run.id);
        let claimed = stories.iter().find(|s| s.story_id == "s1").unwrap();
        assert_eq!(claimed.status, StoryStatus::Claiming);
    }

    #[test]
    fn claim_story_with_no_pending_but_a_failure_fails_loop_and_run() {
        let (_dir, mut store) = open_store();
        let run = antfarm_core::Run::builder().scheduler(Scheduler::Daemon).build();
        let implement =
            step_for(run.id, |b| b.step_id("implement").status(StepStatus::Running).kind(StepType::Loop));
        let implement_id = implement.id;
        let failed_story = story_for(run.id, |b| b.story_index(0).story_id("s1").status(StoryStatus::Failed));
        store
            .with_transaction::<_, PipelineError>(|txn| {
                txn.put_run(run.clone());
                txn.insert_step(implement)?;
                txn.put_story(failed_story);
                Ok(())
            })
            .unwrap();

        let spec = WorkflowSpec::parse(LOOP_SPEC.as_bytes(), "test").unwrap();
        let mut engine = PipelineEngine::new(&mut store, FakeClock::new());
        assert!(engine.claim_story(&implement_id, &spec).unwrap().is_none());
        assert_eq!(engine_step_status(&engine, &implement_id), StepStatus::Failed);
        assert_eq!(engine.store.state().run(&run.id).unwrap().status, RunStatus::Failed);
    }
}
