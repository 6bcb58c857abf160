// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic state directory layout.
//!
//! Log paths are derived from (workspace, project, job) ids so log
//! retrieval never needs a directory scan.

use kiln_core::{JobId, LockScope};
use std::path::{Path, PathBuf};

/// Durable job collection.
pub fn jobs_file(state_dir: &Path) -> PathBuf {
    state_dir.join("jobs.json")
}

/// Durable preview record collection.
pub fn previews_file(state_dir: &Path) -> PathBuf {
    state_dir.join("previews.json")
}

/// Directory holding one lock file per scope.
pub fn locks_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("locks")
}

pub fn lock_path(state_dir: &Path, scope: &LockScope) -> PathBuf {
    locks_dir(state_dir).join(scope.file_name())
}

/// Per-run build log: `logs/<ws>/<project>.<job>.log`.
pub fn job_log_path(state_dir: &Path, workspace_id: &str, project_id: &str, job_id: &JobId) -> PathBuf {
    state_dir
        .join("logs")
        .join(workspace_id)
        .join(format!("{}.{}.log", project_id, job_id))
}

/// Per-project preview log: `logs/<ws>/<project>.preview.log`.
pub fn preview_log_path(state_dir: &Path, workspace_id: &str, project_id: &str) -> PathBuf {
    state_dir
        .join("logs")
        .join(workspace_id)
        .join(format!("{}.preview.log", project_id))
}

/// Root of all workspace project trees.
pub fn workspaces_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("workspaces")
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
