// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record and status state machine.

use crate::id::JobId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What a job executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Build,
    Preview,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Build => write!(f, "build"),
            JobKind::Preview => write!(f, "preview"),
        }
    }
}

/// Job lifecycle status.
///
/// Transitions are monotonic: `Pending → Running → {Success, Failed}`.
/// Terminal states never transition again; the mutators on [`Job`]
/// enforce this by ignoring updates to terminal jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }

    /// Pending or running.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Success => write!(f, "success"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One execution attempt of a build (or preview-start) for a project.
///
/// Created by the build executor before spawning, mutated while the
/// child runs, immutable once terminal. Remains in the store for
/// history and log retrieval until pruned externally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub workspace_id: String,
    pub project_id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    /// Pid of the spawned child, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Append-only log file for this job's child output.
    pub log_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    pub fn new(
        workspace_id: impl Into<String>,
        project_id: impl Into<String>,
        kind: JobKind,
        log_path: PathBuf,
        now_ms: u64,
    ) -> Self {
        Self {
            id: JobId::new(),
            workspace_id: workspace_id.into(),
            project_id: project_id.into(),
            kind,
            status: JobStatus::Pending,
            created_at_ms: now_ms,
            started_at_ms: None,
            finished_at_ms: None,
            pid: None,
            log_path,
            exit_code: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Record the spawned child's pid. No-op once terminal.
    pub fn set_pid(&mut self, pid: u32) {
        if !self.is_terminal() {
            self.pid = Some(pid);
        }
    }

    /// `Pending → Running`. No-op from any other state.
    pub fn mark_running(&mut self, now_ms: u64) {
        if self.status == JobStatus::Pending {
            self.status = JobStatus::Running;
            self.started_at_ms = Some(now_ms);
        }
    }

    /// Terminal transition from the child's exit code: 0 is success,
    /// anything else fails with an `exit-<code>` reason.
    pub fn complete(&mut self, exit_code: i32, now_ms: u64) {
        if self.is_terminal() {
            return;
        }
        self.exit_code = Some(exit_code);
        self.finished_at_ms = Some(now_ms);
        if exit_code == 0 {
            self.status = JobStatus::Success;
        } else {
            self.status = JobStatus::Failed;
            self.error = Some(format!("exit-{}", exit_code));
        }
    }

    /// Terminal failure without an exit code (spawn error, recovery).
    pub fn fail(&mut self, reason: impl Into<String>, now_ms: u64) {
        if self.is_terminal() {
            return;
        }
        self.status = JobStatus::Failed;
        self.finished_at_ms = Some(now_ms);
        self.error = Some(reason.into());
    }

    /// Age since creation, saturating at zero for clock skew.
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.created_at_ms)
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
