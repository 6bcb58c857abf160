// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-only project state assembly.

use kiln_core::{pid_alive, Clock, Job, PreviewRecord};
use kiln_store::{tail_lines, JobStore, PreviewStore};
use serde::Serialize;

/// Aggregated view of one project for status surfaces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectState {
    pub latest_job: Option<Job>,
    pub preview: Option<PreviewRecord>,
    /// A build is genuinely in flight (active status, live pid).
    pub building: bool,
    /// Whether a new build would be admitted right now.
    pub can_build: bool,
    /// The preview record claims running and its pid checks out.
    pub preview_healthy: bool,
}

pub fn project_state<C: Clock>(
    jobs: &JobStore<C>,
    previews: &PreviewStore<C>,
    workspace_id: &str,
    project_id: &str,
) -> ProjectState {
    let building = jobs.running_for(workspace_id, project_id).is_some();
    let latest_job = jobs.latest_for(workspace_id, project_id);
    let preview = previews.get(workspace_id, project_id);
    let preview_healthy = preview
        .as_ref()
        .is_some_and(|r| r.is_running() && r.pid.is_some_and(pid_alive));

    ProjectState {
        latest_job,
        preview,
        building,
        can_build: !building,
        preview_healthy,
    }
}

/// Last `max` lines of the latest build's log, empty when the project
/// has never built.
pub fn latest_log_tail<C: Clock>(
    jobs: &JobStore<C>,
    workspace_id: &str,
    project_id: &str,
    max: usize,
) -> Vec<String> {
    jobs.latest_for(workspace_id, project_id)
        .map(|job| tail_lines(&job.log_path, max))
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
