// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `peekAndSpawn` (§4.6): the claim -> spawn -> confirm/rollback handshake.
//!
//! The claim and the confirm/rollback transitions each run inside their own
//! [`Store::with_transaction`] call, exactly like the Pipeline Engine; the
//! Gateway call in between is plain I/O and never holds a transaction open.

use antfarm_core::{
    ActiveSession, AgentId, Clock, Event, EventKind, RunId, SessionId, SessionKey, SpawnedBy,
    Step, StepId, StepStatus, StoryId, StoryStatus,
};
use antfarm_events::{Journal, WebhookSink};
use antfarm_gateway::{Gateway, SpawnRequest, ThinkingLevel as WireThinking};
use antfarm_pipeline::{ClaimResult, PipelineEngine};
use antfarm_runbook::{ThinkingLevel, WorkflowSpec};
use antfarm_storage::Store;

use crate::error::SpawnerError;
use crate::types::{NotSpawnedReason, SpawnOutcome};

/// Completion instructions appended to every resolved prompt (§4.6, §6): the
/// worker reports back through the CLI, never through the Gateway itself.
const COMPLETION_INSTRUCTIONS: &str = "\n\nWhen finished, report back by running `antfarm step complete <step-id>` with your output on stdin, or `antfarm step fail <step-id> \"<reason>\"` if you cannot finish.";

pub struct Spawner<C: Clock> {
    clock: C,
}

impl<C: Clock> Spawner<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    /// `peekAndSpawn(agent_id, spec, source)`.
    pub async fn peek_and_spawn(
        &self,
        store: &mut Store,
        journal: Option<&Journal>,
        gateway: &dyn Gateway,
        spec: &WorkflowSpec,
        agent_id: &AgentId,
        source: SpawnedBy,
    ) -> Result<SpawnOutcome, SpawnerError> {
        let mut engine = PipelineEngine::new(store, self.clock.clone());
        if let Some(journal) = journal {
            engine = engine.with_journal(journal);
        }
        let step_claim = engine.claim_step(agent_id)?;

        if let Some(claim) = step_claim {
            let claimed = claimed_from(store, claim);
            return self.spawn_claimed(store, journal, gateway, spec, agent_id, claimed, source).await;
        }

        let Some(loop_step) = running_loop_step_for_agent(store, agent_id) else {
            return Ok(SpawnOutcome::NotSpawned { reason: NotSpawnedReason::NoWork });
        };

        if let Some(story_id) = loop_step.current_story_id {
            if story_is_in_flight(store, &story_id) {
                return Ok(SpawnOutcome::NotSpawned { reason: NotSpawnedReason::StoryAlreadyClaimed });
            }
        }

        let mut engine = PipelineEngine::new(store, self.clock.clone());
        if let Some(journal) = journal {
            engine = engine.with_journal(journal);
        }
        let story_claim = engine.claim_story(&loop_step.id, spec)?;

        match story_claim {
            Some(claim) => {
                let claimed = claimed_from(store, claim);
                self.spawn_claimed(store, journal, gateway, spec, agent_id, claimed, source).await
            }
            None => Ok(SpawnOutcome::NotSpawned { reason: NotSpawnedReason::NoWork }),
        }
    }

    async fn spawn_claimed(
        &self,
        store: &mut Store,
        journal: Option<&Journal>,
        gateway: &dyn Gateway,
        spec: &WorkflowSpec,
        agent_id: &AgentId,
        claim: Claimed,
        source: SpawnedBy,
    ) -> Result<SpawnOutcome, SpawnerError> {
        let agent_def = spec
            .agents()
            .iter()
            .find(|a| a.id == agent_id.as_str())
            .ok_or_else(|| SpawnerError::UnknownAgent(agent_id.to_string()))?;

        let session_key_str = wire_session_key(
            agent_id,
            &claim.run_id.to_string(),
            &claim.step_id.to_string(),
            claim.story_human_id.as_deref(),
        );
        let idempotency_key = format!(
            "antfarm:{}:{}:{}:{}",
            claim.run_id,
            claim.step_id,
            claim.story_human_id.as_deref().unwrap_or("root"),
            nanoid::nanoid!(8),
        );
        let message = format!("{}{}", claim.resolved_input, COMPLETION_INSTRUCTIONS);
        let request = SpawnRequest::new(
            idempotency_key,
            agent_def.id.clone(),
            session_key_str,
            message,
            agent_def.timeout_seconds,
            wire_thinking(agent_def.thinking),
        );

        match gateway.call_agent(&request).await {
            Ok(response) if response.is_accepted() => {
                let session_id = gateway.resolve_session_id(&response.run_id).await;
                self.confirm_spawn(store, journal, agent_id, claim, session_id.into(), source)
            }
            Ok(response) => {
                let error = format!("gateway status: {}", response.status);
                self.rollback_spawn(store, journal, claim, error)
            }
            Err(err) => self.rollback_spawn(store, journal, claim, err.to_string()),
        }
    }

    fn confirm_spawn(
        &self,
        store: &mut Store,
        journal: Option<&Journal>,
        agent_id: &AgentId,
        claim: Claimed,
        session_id: SessionId,
        source: SpawnedBy,
    ) -> Result<SpawnOutcome, SpawnerError> {
        let now = self.clock.now_iso8601();
        let run_id = claim.run_id;
        let step_id = claim.step_id;
        let story_id = claim.story_id;

        let events = store.with_transaction::<_, SpawnerError>(|txn| {
            let mut events = Vec::new();

            let session_key = match story_id {
                Some(story_id) => {
                    let mut story = txn
                        .state()
                        .story(&story_id)
                        .cloned()
                        .ok_or_else(|| SpawnerError::StoryNotFound(story_id.to_string()))?;
                    story.status = StoryStatus::Running;
                    story.updated_at = now.clone();
                    let human_id = story.story_id.clone();
                    txn.put_story(story);
                    events.push(
                        Event::new(EventKind::StoryStarted, run_id)
                            .step_id(step_id)
                            .story_id(story_id)
                            .agent_id(*agent_id)
                            .session_id(session_id),
                    );
                    SessionKey::for_story(*agent_id, step_id, human_id)
                }
                None => {
                    let mut step = txn
                        .state()
                        .step(&step_id)
                        .cloned()
                        .ok_or_else(|| SpawnerError::StepNotFound(step_id.to_string()))?;
                    step.status = StepStatus::Running;
                    step.updated_at = now.clone();
                    txn.put_step(step);
                    events.push(
                        Event::new(EventKind::StepRunning, run_id)
                            .step_id(step_id)
                            .agent_id(*agent_id)
                            .session_id(session_id),
                    );
                    SessionKey::for_step(*agent_id, step_id)
                }
            };

            txn.put_active_session(ActiveSession {
                key: session_key,
                run_id,
                spawned_at: now.clone(),
                spawned_by: source,
                session_id,
            });

            Ok(events)
        })?;

        for event in events {
            emit(store, journal, event, self.clock.now_iso8601());
        }

        Ok(SpawnOutcome::Spawned { run_id, step_id, story_id, agent_id: *agent_id, session_id })
    }

    fn rollback_spawn(
        &self,
        store: &mut Store,
        journal: Option<&Journal>,
        claim: Claimed,
        error: String,
    ) -> Result<SpawnOutcome, SpawnerError> {
        let now = self.clock.now_iso8601();
        let run_id = claim.run_id;
        let step_id = claim.step_id;
        let story_id = claim.story_id;

        let events = store.with_transaction::<_, SpawnerError>(|txn| {
            let mut events = Vec::new();

            if let Some(story_id) = story_id {
                if let Some(mut story) = txn.state().story(&story_id).cloned() {
                    story.status = StoryStatus::Pending;
                    story.updated_at = now.clone();
                    txn.put_story(story);
                }
                if let Some(mut step) = txn.state().step(&step_id).cloned() {
                    if step.current_story_id == Some(story_id) {
                        step.current_story_id = None;
                        step.updated_at = now.clone();
                        txn.put_step(step);
                    }
                }
                events.push(Event::new(EventKind::StoryRollback, run_id).step_id(step_id).story_id(story_id));
            } else if let Some(mut step) = txn.state().step(&step_id).cloned() {
                step.status = StepStatus::Pending;
                step.updated_at = now.clone();
                txn.put_step(step);
                events.push(Event::new(EventKind::StepRollback, run_id).step_id(step_id));
            }

            Ok(events)
        })?;

        for event in events {
            emit(store, journal, event, self.clock.now_iso8601());
        }

        Ok(SpawnOutcome::RolledBack { run_id, step_id, story_id, error })
    }
}

/// A resolved claim plus the human-readable story id the wire protocol's
/// session key and idempotency key are built from (distinct from the
/// internal [`StoryId`] [`ClaimResult`] already carries).
struct Claimed {
    run_id: RunId,
    step_id: StepId,
    story_id: Option<StoryId>,
    story_human_id: Option<String>,
    resolved_input: String,
}

fn claimed_from(store: &Store, claim: ClaimResult) -> Claimed {
    let story_human_id = claim.story_id.and_then(|id| store.state().story(&id)).map(|s| s.story_id.clone());
    Claimed {
        run_id: claim.run_id,
        step_id: claim.step_id,
        story_id: claim.story_id,
        story_human_id,
        resolved_input: claim.resolved_input,
    }
}

fn running_loop_step_for_agent(store: &Store, agent_id: &AgentId) -> Option<Step> {
    store.state().steps_for_agent(agent_id).find(|s| s.is_loop() && s.status == StepStatus::Running).cloned()
}

fn story_is_in_flight(store: &Store, story_id: &StoryId) -> bool {
    store
        .state()
        .story(story_id)
        .map(|s| matches!(s.status, StoryStatus::Running | StoryStatus::Claiming))
        .unwrap_or(false)
}

fn wire_session_key(agent_id: &AgentId, run_id: &str, step_id: &str, story_human_id: Option<&str>) -> String {
    match story_human_id {
        Some(story) => format!("agent:{agent_id}:workflow:{run_id}:{step_id}:{story}"),
        None => format!("agent:{agent_id}:workflow:{run_id}:{step_id}"),
    }
}

fn wire_thinking(level: ThinkingLevel) -> WireThinking {
    match level {
        ThinkingLevel::Off => WireThinking::Off,
        ThinkingLevel::Minimal => WireThinking::Minimal,
        ThinkingLevel::Low => WireThinking::Low,
        ThinkingLevel::Medium => WireThinking::Medium,
        ThinkingLevel::High => WireThinking::High,
    }
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
