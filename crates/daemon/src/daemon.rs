// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The daemon loop (§4.7): one timer ticks the Spawner over every
//! daemon-scheduled run's agents, two more timers drive the Sweeper's
//! claiming-rollback and session-GC passes.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use antfarm_core::{AgentId, Clock, RunStatus, Scheduler, SpawnedBy};
use antfarm_events::Journal;
use antfarm_gateway::Gateway;
use antfarm_pipeline::SpecCache;
use antfarm_spawner::Spawner;
use antfarm_storage::Store;
use antfarm_sweeper::Sweeper;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::DaemonError;

/// Ties the Store, Spec Cache, Sweeper and Spawner together for one
/// process. Holds no lock beyond what each of those already holds;
/// `run_once`/`run` take `&mut Store` per call the way every other engine
/// in this workspace does.
pub struct Daemon<C: Clock> {
    config: Config,
    spec_cache: SpecCache<C>,
    sweeper: Sweeper<C>,
    spawner: Spawner<C>,
}

impl<C: Clock> Daemon<C> {
    pub fn new(config: Config, clock: C) -> Self {
        let spec_cache = SpecCache::new(config.workflows_path.clone(), clock.clone());
        let sweeper =
            Sweeper::new(clock.clone()).with_cadences(config.sweep_interval, config.claiming_sweep_interval);
        let spawner = Spawner::new(clock);
        Self { config, spec_cache, sweeper, spawner }
    }

    /// One tick: §4.7 steps 1-3. Sweep passes are interleaved rather than
    /// run on their own tasks since the whole loop is single-threaded by
    /// design (§5 "Scheduling model").
    pub async fn tick(
        &self,
        store: &mut Store,
        journal: Option<&Journal>,
        gateway: &dyn Gateway,
    ) -> Result<(), DaemonError> {
        let workflow_ids = self.daemon_scheduled_workflow_ids(store);
        let mut max_agent_timeout = Duration::from_secs(3600);

        for workflow_id in workflow_ids {
            if !self.config.allows(&workflow_id) {
                continue;
            }

            let spec = match self.spec_cache.get_spec(&workflow_id) {
                Ok(spec) => spec,
                Err(e) => {
                    warn!(workflow_id = %workflow_id, error = %e, "failed to resolve workflow spec");
                    continue;
                }
            };

            for agent in spec.agents() {
                max_agent_timeout = max_agent_timeout.max(Duration::from_secs(agent.timeout_seconds));
                let agent_id = AgentId::from_string(agent.id.clone());
                match self.spawner.peek_and_spawn(store, journal, gateway, &spec, &agent_id, SpawnedBy::Daemon).await
                {
                    Ok(outcome) => debug!(workflow_id = %workflow_id, agent_id = %agent.id, outcome = ?outcome, "peekAndSpawn"),
                    Err(e) => warn!(workflow_id = %workflow_id, agent_id = %agent.id, error = %e, "peekAndSpawn failed"),
                }
            }
        }

        let report = self.sweeper.sweep(store, &self.spec_cache, journal, max_agent_timeout)?;
        if !report.skipped_throttled {
            debug!(?report, "recovery sweep");
        }
        Ok(())
    }

    pub fn sweep_claiming(&self, store: &mut Store, journal: Option<&Journal>) -> Result<(), DaemonError> {
        let report = self.sweeper.sweep_claiming(store, journal)?;
        if !report.skipped_throttled {
            debug!(?report, "claiming-rollback sweep");
        }
        Ok(())
    }

    pub fn gc_active_sessions(&self, store: &mut Store) -> Result<(), DaemonError> {
        let report = self.sweeper.gc_active_sessions(store)?;
        if report.sessions_reclaimed > 0 {
            debug!(?report, "session GC");
        }
        Ok(())
    }

    fn daemon_scheduled_workflow_ids(&self, store: &Store) -> BTreeSet<String> {
        store
            .state()
            .runs_with_status(RunStatus::Running)
            .filter(|run| run.scheduler == Scheduler::Daemon)
            .map(|run| run.workflow_id.clone())
            .collect()
    }
}

/// Runs the ticker, the claiming-rollback timer, and the session-GC timer
/// until `shutdown` resolves. Re-entrancy: `tokio::time::interval`'s
/// default `MissedTickBehavior::Burst` would fire a tick immediately for
/// every missed interval if a tick overruns, so each arm is switched to
/// `Delay` to get a quick-exit skip instead of a burst of concurrent ticks.
pub async fn run<C: Clock + 'static>(
    daemon: Arc<Daemon<C>>,
    store: Arc<tokio::sync::Mutex<Store>>,
    journal: Option<Arc<Journal>>,
    gateway: Arc<dyn Gateway>,
    poll_interval: Duration,
    claiming_interval: Duration,
    session_gc_interval: Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut claiming_ticker = tokio::time::interval(claiming_interval);
    claiming_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut gc_ticker = tokio::time::interval(session_gc_interval);
    gc_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if *shutdown.borrow() {
                    break;
                }
                let mut guard = store.lock().await;
                if let Err(e) = daemon.tick(&mut guard, journal.as_deref(), gateway.as_ref()).await {
                    warn!(error = %e, "daemon tick failed");
                }
            }
            _ = claiming_ticker.tick() => {
                if *shutdown.borrow() {
                    break;
                }
                let mut guard = store.lock().await;
                if let Err(e) = daemon.sweep_claiming(&mut guard, journal.as_deref()) {
                    warn!(error = %e, "claiming sweep failed");
                }
            }
            _ = gc_ticker.tick() => {
                if *shutdown.borrow() {
                    break;
                }
                let mut guard = store.lock().await;
                if let Err(e) = daemon.gc_active_sessions(&mut guard) {
                    warn!(error = %e, "session GC failed");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("daemon loop exiting after shutdown signal");
}

#[cfg(test)]
mod tests {
    use super::*;
    use antfarm_core::step::StepBuilder;
    use antfarm_core::{FakeClock, Run, RunId, Scheduler, Step, StepStatus, StepType};
    use antfarm_gateway::FakeGateway;
    use tempfile::tempdir;

    const SPEC: &str = r#"
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

    fn test_config(workflows_path: std::path::PathBuf) -> Config {
        Config {
            state_dir: workflows_path.clone(),
            db_path: workflows_path.join("store.wal"),
            journal_path: workflows_path.join("events.ndjson"),
            pid_path: workflows_path.join("daemon.pid"),
            workflows_path,
            poll_interval: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(300),
            claiming_sweep_interval: Duration::from_secs(120),
            session_gc_interval: Duration::from_secs(600),
            workflow_allowlist: Vec::new(),
        }
    }

    fn pending_step(run_id: RunId) -> Step {
        let mut step =
            StepBuilder::default().step_id("design").step_index(0).status(StepStatus::Pending).kind(StepType::Single).build();
        step.run_id = run_id;
        step.agent_id = AgentId::from_string("a1");
        step
    }

    #[tokio::test]
    async fn tick_spawns_pending_work_for_daemon_scheduled_runs() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("wf.toml"), SPEC).unwrap();
        let mut store = Store::open(&dir.path().join("store.wal")).unwrap();

        let run = Run::builder().workflow_id("wf").scheduler(Scheduler::Daemon).build();
        let step = pending_step(run.id);
        store
            .with_transaction::<_, DaemonError>(|txn| {
                txn.put_run(run.clone());
                txn.insert_step(step.clone())?;
                Ok(())
            })
            .unwrap();

        let gateway = FakeGateway::new();
        gateway.queue_accept("ext-run-1");
        gateway.set_resolved_session("ext-run-1", "ses-test");

        let config = test_config(dir.path().to_path_buf());
        let daemon = Daemon::new(config, FakeClock::new());
        daemon.tick(&mut store, None, &gateway).await.unwrap();

        let spawned = store.state().step(&step.id).unwrap();
        assert_eq!(spawned.status, StepStatus::Running);
        assert_eq!(gateway.calls().len(), 1);
    }

    #[tokio::test]
    async fn tick_skips_workflows_outside_the_allowlist() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("wf.toml"), SPEC).unwrap();
        let mut store = Store::open(&dir.path().join("store.wal")).unwrap();

        let run = Run::builder().workflow_id("wf").scheduler(Scheduler::Daemon).build();
        let step = pending_step(run.id);
        store
            .with_transaction::<_, DaemonError>(|txn| {
                txn.put_run(run.clone());
                txn.insert_step(step.clone())?;
                Ok(())
            })
            .unwrap();

        let gateway = FakeGateway::new();
        gateway.queue_accept("ext-run-1");

        let mut config = test_config(dir.path().to_path_buf());
        config.workflow_allowlist = vec!["other-workflow".to_string()];
        let daemon = Daemon::new(config, FakeClock::new());
        daemon.tick(&mut store, None, &gateway).await.unwrap();

        let untouched = store.state().step(&step.id).unwrap();
        assert_eq!(untouched.status, StepStatus::Pending);
        assert!(gateway.calls().is_empty());
    }
}
