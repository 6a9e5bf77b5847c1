// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The two external signals the engine folds into a run's context before
//! resolving a step's `input_template` (§4.4): a frontend-change heuristic
//! derived from a git diff, and a free-form progress blob maintained by a
//! long-lived loop agent.

use std::path::PathBuf;

/// Detects whether a run's `repo`/`branch` context implies frontend changes
/// against `main`. Implementations never fail the claim path: a detection
/// error simply yields `None` (no augmentation).
pub trait FrontendChangeDetector: Send + Sync {
    fn has_frontend_changes(&self, repo: &str, branch: &str) -> Option<bool>;
}

/// No-op detector: the default when a deployment doesn't wire git access.
pub struct NullFrontendDetector;

impl FrontendChangeDetector for NullFrontendDetector {
    fn has_frontend_changes(&self, _repo: &str, _branch: &str) -> Option<bool> {
        None
    }
}

/// Shells out to `git diff --name-only main...<branch>` inside a checked-out
/// clone of `repo` and reports whether any changed path looks
/// frontend-flavored. `repo` is interpreted as a local working-copy path;
/// remote-URL resolution is left to the caller (mirrors the teacher's
/// blocking git helpers, which also only ever operate on a local path).
pub struct GitDiffFrontendDetector {
    workspace_root: PathBuf,
}

const FRONTEND_EXTENSIONS: &[&str] =
    &[".ts", ".tsx", ".js", ".jsx", ".css", ".scss", ".html", ".vue"];

impl GitDiffFrontendDetector {
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self { workspace_root: workspace_root.into() }
    }
}

impl FrontendChangeDetector for GitDiffFrontendDetector {
    fn has_frontend_changes(&self, repo: &str, branch: &str) -> Option<bool> {
        let repo_path = self.workspace_root.join(repo);
        if !repo_path.exists() {
            return None;
        }
        let output = std::process::Command::new("git")
            .args(["diff", "--name-only", &format!("main...{}", branch)])
            .current_dir(&repo_path)
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let changed = String::from_utf8_lossy(&output.stdout);
        Some(changed.lines().any(|path| FRONTEND_EXTENSIONS.iter().any(|ext| path.ends_with(ext))))
    }
}

/// Reads the free-form progress blob a long-lived loop agent maintains in
/// its workspace, surfaced to later prompts as the `progress` context key.
pub trait ProgressSource: Send + Sync {
    fn read_progress(&self, run_id: &str) -> Option<String>;

    /// Archive the progress file once the run completes (§4.4 advancePipeline).
    fn archive(&self, _run_id: &str) {}
}

pub struct NullProgressSource;

impl ProgressSource for NullProgressSource {
    fn read_progress(&self, _run_id: &str) -> Option<String> {
        None
    }
}

/// One plain-text progress file per run, under `root/<run_id>.progress`.
pub struct FileProgressSource {
    root: PathBuf,
}

impl FileProgressSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, run_id: &str) -> PathBuf {
        self.root.join(format!("{}.progress", run_id))
    }
}

impl ProgressSource for FileProgressSource {
    fn read_progress(&self, run_id: &str) -> Option<String> {
        std::fs::read_to_string(self.path_for(run_id)).ok()
    }

    fn archive(&self, run_id: &str) {
        let path = self.path_for(run_id);
        if path.exists() {
            let _ = std::fs::rename(&path, path.with_extension("progress.archived"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_detector_always_abstains() {
        let detector = NullFrontendDetector;
        assert_eq!(detector.has_frontend_changes("repo", "branch"), None);
    }

    #[test]
    fn null_progress_source_always_abstains() {
        let source = NullProgressSource;
        assert_eq!(source.read_progress("run-1"), None);
    }

    #[test]
    fn file_progress_source_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileProgressSource::new(dir.path());
        std::fs::write(dir.path().join("run-1.progress"), "step 3 of 5").unwrap();
        assert_eq!(source.read_progress("run-1").as_deref(), Some("step 3 of 5"));
    }

    #[test]
    fn file_progress_source_archive_renames_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileProgressSource::new(dir.path());
        let path = dir.path().join("run-1.progress");
        std::fs::write(&path, "partial").unwrap();

        source.archive("run-1");

        assert!(!path.exists());
        assert!(dir.path().join("run-1.progress.archived").exists());
    }
}
