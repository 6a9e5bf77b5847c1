// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state rebuilt by replaying [`crate::StoreOp`]s.

use std::collections::{HashMap, HashSet};

use antfarm_core::{
    ActiveSession, AgentId, Run, RunId, RunStatus, Scheduler, SessionKey, Step, StepId,
    StepStatus, Story, StoryId, StoryStatus,
};
use serde::{Deserialize, Serialize};

use crate::op::StoreOp;

/// The full state derived from the WAL: the four row tables plus the
/// secondary indexes the engine and sweeper need to avoid full scans.
///
/// Indexes are rebuilt from the row tables after deserialization ([`reindex`](Self::reindex))
/// rather than persisted, so a snapshot only ever has one source of truth.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    runs: HashMap<RunId, Run>,
    steps: HashMap<StepId, Step>,
    stories: HashMap<StoryId, Story>,
    active_sessions: HashMap<SessionKey, ActiveSession>,

    #[serde(skip)]
    runs_by_status: HashMap<RunStatus, HashSet<RunId>>,
    #[serde(skip)]
    runs_by_scheduler: HashMap<Scheduler, HashSet<RunId>>,
    #[serde(skip)]
    steps_by_status: HashMap<StepStatus, HashSet<StepId>>,
    #[serde(skip)]
    steps_by_agent: HashMap<AgentId, HashSet<StepId>>,
    #[serde(skip)]
    steps_by_run: HashMap<RunId, HashSet<StepId>>,
    #[serde(skip)]
    stories_by_status: HashMap<StoryStatus, HashSet<StoryId>>,
    #[serde(skip)]
    stories_by_run: HashMap<RunId, HashSet<StoryId>>,
    #[serde(skip)]
    sessions_by_run: HashMap<RunId, HashSet<SessionKey>>,
    #[serde(skip)]
    sessions_by_story: HashMap<StoryId, HashSet<SessionKey>>,
}

impl MaterializedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild every secondary index from the row tables. Call this once
    /// after loading a snapshot from disk (`#[serde(skip)]` fields come back
    /// empty).
    pub fn reindex(&mut self) {
        self.runs_by_status.clear();
        self.runs_by_scheduler.clear();
        self.steps_by_status.clear();
        self.steps_by_agent.clear();
        self.steps_by_run.clear();
        self.stories_by_status.clear();
        self.stories_by_run.clear();
        self.sessions_by_run.clear();
        self.sessions_by_story.clear();

        for run in self.runs.values() {
            index_run(&mut self.runs_by_status, &mut self.runs_by_scheduler, run);
        }
        for step in self.steps.values() {
            index_step(&mut self.steps_by_status, &mut self.steps_by_agent, &mut self.steps_by_run, step);
        }
        for story in self.stories.values() {
            index_story(&mut self.stories_by_status, &mut self.stories_by_run, story);
        }
        for session in self.active_sessions.values() {
            index_session(&mut self.sessions_by_run, &mut self.sessions_by_story, session);
        }
    }

    /// Apply one WAL operation, updating both the row tables and indexes.
    pub fn apply(&mut self, op: &StoreOp) {
        match op {
            StoreOp::PutRun(run) => self.put_run(run.clone()),
            StoreOp::PutStep(step) => self.put_step(step.clone()),
            StoreOp::PutStory(story) => self.put_story(story.clone()),
            StoreOp::PutActiveSession(session) => self.put_active_session(session.clone()),
            StoreOp::RemoveActiveSession(key) => self.remove_active_session(key),
        }
    }

    fn put_run(&mut self, run: Run) {
        if let Some(old) = self.runs.get(&run.id) {
            unindex_run(&mut self.runs_by_status, &mut self.runs_by_scheduler, old);
        }
        index_run(&mut self.runs_by_status, &mut self.runs_by_scheduler, &run);
        self.runs.insert(run.id, run);
    }

    fn put_step(&mut self, step: Step) {
        if let Some(old) = self.steps.get(&step.id) {
            unindex_step(&mut self.steps_by_status, &mut self.steps_by_agent, &mut self.steps_by_run, old);
        }
        index_step(&mut self.steps_by_status, &mut self.steps_by_agent, &mut self.steps_by_run, &step);
        self.steps.insert(step.id, step);
    }

    fn put_story(&mut self, story: Story) {
        if let Some(old) = self.stories.get(&story.id) {
            unindex_story(&mut self.stories_by_status, &mut self.stories_by_run, old);
        }
        index_story(&mut self.stories_by_status, &mut self.stories_by_run, &story);
        self.stories.insert(story.id, story);
    }

    fn put_active_session(&mut self, session: ActiveSession) {
        if let Some(old) = self.active_sessions.get(&session.key) {
            unindex_session(&mut self.sessions_by_run, &mut self.sessions_by_story, old);
        }
        index_session(&mut self.sessions_by_run, &mut self.sessions_by_story, &session);
        self.active_sessions.insert(session.key.clone(), session);
    }

    fn remove_active_session(&mut self, key: &SessionKey) {
        if let Some(old) = self.active_sessions.remove(key) {
            unindex_session(&mut self.sessions_by_run, &mut self.sessions_by_story, &old);
        }
    }

    // --- read accessors ---

    pub fn run(&self, id: &RunId) -> Option<&Run> {
        self.runs.get(id)
    }

    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps.get(id)
    }

    pub fn story(&self, id: &StoryId) -> Option<&Story> {
        self.stories.get(id)
    }

    pub fn active_session(&self, key: &SessionKey) -> Option<&ActiveSession> {
        self.active_sessions.get(key)
    }

    pub fn all_runs(&self) -> impl Iterator<Item = &Run> {
        self.runs.values()
    }

    pub fn all_active_sessions(&self) -> impl Iterator<Item = &ActiveSession> {
        self.active_sessions.values()
    }

    pub fn runs_with_status(&self, status: RunStatus) -> impl Iterator<Item = &Run> {
        self.runs_by_status
            .get(&status)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.runs.get(id))
    }

    pub fn runs_with_scheduler(&self, scheduler: Scheduler) -> impl Iterator<Item = &Run> {
        self.runs_by_scheduler
            .get(&scheduler)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.runs.get(id))
    }

    pub fn steps_with_status(&self, status: StepStatus) -> impl Iterator<Item = &Step> {
        self.steps_by_status
            .get(&status)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.steps.get(id))
    }

    pub fn steps_for_agent(&self, agent_id: &AgentId) -> impl Iterator<Item = &Step> {
        self.steps_by_agent
            .get(agent_id)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.steps.get(id))
    }

    /// Steps belonging to `run_id`, ordered by `step_index`.
    pub fn steps_for_run(&self, run_id: &RunId) -> Vec<&Step> {
        let mut steps: Vec<&Step> = self
            .steps_by_run
            .get(run_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.steps.get(id))
            .collect();
        steps.sort_by_key(|s| s.step_index);
        steps
    }

    pub fn stories_with_status(&self, status: StoryStatus) -> impl Iterator<Item = &Story> {
        self.stories_by_status
            .get(&status)
            .into_iter()
            .flatten()
            .filter_map(move |id| self.stories.get(id))
    }

    /// Stories belonging to `run_id`, ordered by `story_index`.
    pub fn stories_for_run(&self, run_id: &RunId) -> Vec<&Story> {
        let mut stories: Vec<&Story> = self
            .stories_by_run
            .get(run_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.stories.get(id))
            .collect();
        stories.sort_by_key(|s| s.story_index);
        stories
    }

    pub fn active_sessions_for_run(&self, run_id: &RunId) -> impl Iterator<Item = &ActiveSession> {
        self.sessions_by_run
            .get(run_id)
            .into_iter()
            .flatten()
            .filter_map(move |key| self.active_sessions.get(key))
    }

    pub fn active_sessions_for_story(&self, story_id: &StoryId) -> impl Iterator<Item = &ActiveSession> {
        self.sessions_by_story
            .get(story_id)
            .into_iter()
            .flatten()
            .filter_map(move |key| self.active_sessions.get(key))
    }
}

fn index_run(
    by_status: &mut HashMap<RunStatus, HashSet<RunId>>,
    by_scheduler: &mut HashMap<Scheduler, HashSet<RunId>>,
    run: &Run,
) {
    by_status.entry(run.status).or_default().insert(run.id);
    by_scheduler.entry(run.scheduler).or_default().insert(run.id);
}

fn unindex_run(
    by_status: &mut HashMap<RunStatus, HashSet<RunId>>,
    by_scheduler: &mut HashMap<Scheduler, HashSet<RunId>>,
    run: &Run,
) {
    if let Some(set) = by_status.get_mut(&run.status) {
        set.remove(&run.id);
    }
    if let Some(set) = by_scheduler.get_mut(&run.scheduler) {
        set.remove(&run.id);
    }
}

fn index_step(
    by_status: &mut HashMap<StepStatus, HashSet<StepId>>,
    by_agent: &mut HashMap<AgentId, HashSet<StepId>>,
    by_run: &mut HashMap<RunId, HashSet<StepId>>,
    step: &Step,
) {
    by_status.entry(step.status).or_default().insert(step.id);
    by_agent.entry(step.agent_id).or_default().insert(step.id);
    by_run.entry(step.run_id).or_default().insert(step.id);
}

fn unindex_step(
    by_status: &mut HashMap<StepStatus, HashSet<StepId>>,
    by_agent: &mut HashMap<AgentId, HashSet<StepId>>,
    by_run: &mut HashMap<RunId, HashSet<StepId>>,
    step: &Step,
) {
    if let Some(set) = by_status.get_mut(&step.status) {
        set.remove(&step.id);
    }
    if let Some(set) = by_agent.get_mut(&step.agent_id) {
        set.remove(&step.id);
    }
    if let Some(set) = by_run.get_mut(&step.run_id) {
        set.remove(&step.id);
    }
}

fn index_story(
    by_status: &mut HashMap<StoryStatus, HashSet<StoryId>>,
    by_run: &mut HashMap<RunId, HashSet<StoryId>>,
    story: &Story,
) {
    by_status.entry(story.status).or_default().insert(story.id);
    by_run.entry(story.run_id).or_default().insert(story.id);
}

fn unindex_story(
    by_status: &mut HashMap<StoryStatus, HashSet<StoryId>>,
    by_run: &mut HashMap<RunId, HashSet<StoryId>>,
    story: &Story,
) {
    if let Some(set) = by_status.get_mut(&story.status) {
        set.remove(&story.id);
    }
    if let Some(set) = by_run.get_mut(&story.run_id) {
        set.remove(&story.id);
    }
}

fn index_session(
    by_run: &mut HashMap<RunId, HashSet<SessionKey>>,
    by_story: &mut HashMap<StoryId, HashSet<SessionKey>>,
    session: &ActiveSession,
) {
    by_run.entry(session.run_id).or_default().insert(session.key.clone());
    if !session.key.story_id.is_empty() {
        let story_id = StoryId::from_string(&session.key.story_id);
        by_story.entry(story_id).or_default().insert(session.key.clone());
    }
}

fn unindex_session(
    by_run: &mut HashMap<RunId, HashSet<SessionKey>>,
    by_story: &mut HashMap<StoryId, HashSet<SessionKey>>,
    session: &ActiveSession,
) {
    if let Some(set) = by_run.get_mut(&session.run_id) {
        set.remove(&session.key);
    }
    if !session.key.story_id.is_empty() {
        let story_id = StoryId::from_string(&session.key.story_id);
        if let Some(set) = by_story.get_mut(&story_id) {
            set.remove(&session.key);
        }
    }
}
