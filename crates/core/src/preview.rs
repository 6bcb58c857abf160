// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Preview record: state of a long-lived dev-server process.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewStatus {
    Running,
    Stopped,
    Failed,
}

impl std::fmt::Display for PreviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreviewStatus::Running => write!(f, "running"),
            PreviewStatus::Stopped => write!(f, "stopped"),
            PreviewStatus::Failed => write!(f, "failed"),
        }
    }
}

/// State of the dev-server process for one (workspace, project).
///
/// At most one running record exists per project. A running record
/// whose pid is no longer alive is stale and must be treated as
/// stopped before a new preview starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewRecord {
    pub workspace_id: String,
    pub project_id: String,
    pub status: PreviewStatus,
    pub pid: Option<u32>,
    pub port: Option<u16>,
    pub url: Option<String>,
    pub log_path: Option<PathBuf>,
    pub started_at_ms: Option<u64>,
    pub stopped_at_ms: Option<u64>,
    pub last_error: Option<String>,
}

impl PreviewRecord {
    /// Fresh running record for a just-spawned preview process.
    pub fn running(
        workspace_id: impl Into<String>,
        project_id: impl Into<String>,
        pid: u32,
        port: u16,
        url: impl Into<String>,
        log_path: PathBuf,
        now_ms: u64,
    ) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            project_id: project_id.into(),
            status: PreviewStatus::Running,
            pid: Some(pid),
            port: Some(port),
            url: Some(url.into()),
            log_path: Some(log_path),
            started_at_ms: Some(now_ms),
            stopped_at_ms: None,
            last_error: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == PreviewStatus::Running
    }

    /// Transition to stopped: the process is gone. Clears pid, port
    /// and url but keeps the log path and start time for history.
    pub fn mark_stopped(&mut self, reason: impl Into<String>, now_ms: u64) {
        self.status = PreviewStatus::Stopped;
        self.pid = None;
        self.port = None;
        self.url = None;
        self.stopped_at_ms = Some(now_ms);
        self.last_error = Some(reason.into());
    }

    /// Transition to failed. Unlike `mark_stopped` this keeps pid,
    /// port and url: a startup-timeout failure deliberately leaves the
    /// process running, and an explicit stop must still be able to
    /// target it.
    pub fn mark_failed(&mut self, reason: impl Into<String>, now_ms: u64) {
        self.status = PreviewStatus::Failed;
        self.stopped_at_ms = Some(now_ms);
        self.last_error = Some(reason.into());
    }
}

#[cfg(test)]
#[path = "preview_tests.rs"]
mod tests;
