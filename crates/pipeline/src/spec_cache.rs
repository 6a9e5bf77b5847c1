// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Workflow Spec Cache (§4.3): `getSpec` loads a workflow's TOML file
//! from `{root}/{workflow_id}.toml`, re-parsing on miss, TTL expiry, or a
//! changed content digest.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use antfarm_core::Clock;
use antfarm_runbook::{content_digest, WorkflowSpec};
use parking_lot::Mutex;

use crate::error::PipelineError;

/// Entries expire after this long even if the file never changes.
pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);

struct CacheEntry {
    spec: Arc<WorkflowSpec>,
    digest: String,
    cached_at_epoch_ms: u64,
}

/// Operational counters exposed for observability (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub hit_rate: f64,
}

/// Caches parsed [`WorkflowSpec`]s by workflow id. Keyed only by workflow
/// id; there is no negative caching, so a lookup for a workflow whose file
/// does not exist always re-hits the filesystem.
pub struct SpecCache<C: Clock> {
    root: PathBuf,
    clock: C,
    entries: Mutex<HashMap<String, CacheEntry>>,
    hits: Mutex<u64>,
    misses: Mutex<u64>,
}

impl<C: Clock> SpecCache<C> {
    pub fn new(root: impl Into<PathBuf>, clock: C) -> Self {
        Self {
            root: root.into(),
            clock,
            entries: Mutex::new(HashMap::new()),
            hits: Mutex::new(0),
            misses: Mutex::new(0),
        }
    }

    fn path_for(&self, workflow_id: &str) -> PathBuf {
        self.root.join(format!("{}.toml", workflow_id))
    }

    /// Load (or return a cached) [`WorkflowSpec`] for `workflow_id`.
    pub fn get_spec(&self, workflow_id: &str) -> Result<Arc<WorkflowSpec>, PipelineError> {
        let path = self.path_for(workflow_id);
        let bytes = std::fs::read(&path).map_err(|source| {
            PipelineError::Spec(antfarm_runbook::RunbookError::Io {
                path: path.display().to_string(),
                source,
            })
        })?;
        let digest = content_digest(&bytes);
        let now = self.clock.epoch_ms();

        {
            let entries = self.entries.lock();
            if let Some(entry) = entries.get(workflow_id) {
                let fresh = now.saturating_sub(entry.cached_at_epoch_ms) < CACHE_TTL.as_millis() as u64;
                if fresh && entry.digest == digest {
                    *self.hits.lock() += 1;
                    return Ok(entry.spec.clone());
                }
            }
        }

        *self.misses.lock() += 1;
        let spec = Arc::new(WorkflowSpec::parse(&bytes, &path.display().to_string())?);
        self.entries.lock().insert(
            workflow_id.to_string(),
            CacheEntry { spec: spec.clone(), digest, cached_at_epoch_ms: now },
        );
        Ok(spec)
    }

    /// Drop a cached entry, forcing the next `get_spec` to re-read the file.
    pub fn invalidate(&self, workflow_id: &str) {
        self.entries.lock().remove(workflow_id);
    }

    pub fn stats(&self) -> CacheStats {
        let hits = *self.hits.lock();
        let misses = *self.misses.lock();
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            size: self.entries.lock().len(),
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use antfarm_core::FakeClock;

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
        input = "do it"
    "#;

    fn write_spec(dir: &Path, workflow_id: &str, contents: &str) {
        std::fs::write(dir.join(format!("{}.toml", workflow_id)), contents).unwrap();
    }

    #[test]
    fn miss_then_hit_on_unchanged_file() {
        let dir = tempfile::tempdir().unwrap();
        write_spec(dir.path(), "wf", SPEC);
        let cache = SpecCache::new(dir.path(), FakeClock::new());

        cache.get_spec("wf").unwrap();
        cache.get_spec("wf").unwrap();

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn changed_digest_forces_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        write_spec(dir.path(), "wf", SPEC);
        let cache = SpecCache::new(dir.path(), FakeClock::new());
        cache.get_spec("wf").unwrap();

        let changed = SPEC.replace("do it", "do it differently");
        write_spec(dir.path(), "wf", &changed);
        let spec = cache.get_spec("wf").unwrap();

        assert_eq!(spec.steps()[0].input, "do it differently");
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn ttl_expiry_forces_a_miss_even_if_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        write_spec(dir.path(), "wf", SPEC);
        let clock = FakeClock::new();
        let cache = SpecCache::new(dir.path(), clock.clone());
        cache.get_spec("wf").unwrap();

        clock.advance(CACHE_TTL + Duration::from_secs(1));
        cache.get_spec("wf").unwrap();

        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn invalidate_forces_next_lookup_to_reparse() {
        let dir = tempfile::tempdir().unwrap();
        write_spec(dir.path(), "wf", SPEC);
        let cache = SpecCache::new(dir.path(), FakeClock::new());
        cache.get_spec("wf").unwrap();

        cache.invalidate("wf");
        cache.get_spec("wf").unwrap();

        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn missing_file_surfaces_an_error_without_caching() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SpecCache::new(dir.path(), FakeClock::new());
        assert!(cache.get_spec("nope").is_err());
        assert_eq!(cache.stats().size, 0);
    }
}
