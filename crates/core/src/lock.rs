// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lock scopes and on-disk lock records.

use crate::id::JobId;
use serde::{Deserialize, Serialize};

/// Resource a lock protects: the single global build slot, or one
/// project within a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum LockScope {
    Global,
    Project { workspace_id: String, project_id: String },
}

impl LockScope {
    pub fn project(workspace_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        LockScope::Project {
            workspace_id: workspace_id.into(),
            project_id: project_id.into(),
        }
    }

    /// Deterministic lock file name for this scope.
    pub fn file_name(&self) -> String {
        match self {
            LockScope::Global => "global.lock.json".to_string(),
            LockScope::Project { workspace_id, project_id } => {
                format!("project-{}-{}.lock.json", workspace_id, project_id)
            }
        }
    }
}

impl std::fmt::Display for LockScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockScope::Global => write!(f, "global"),
            LockScope::Project { workspace_id, project_id } => {
                write!(f, "project:{}/{}", workspace_id, project_id)
            }
        }
    }
}

/// Exclusive ownership record persisted to a lock file.
///
/// A record is live while its holder process is alive and its TTL has
/// not elapsed since the last heartbeat. Anything else is stale and
/// may be reclaimed by the next acquirer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    #[serde(flatten)]
    pub scope: LockScope,
    /// Holder process id.
    pub pid: u32,
    /// Job the holder is running, bound after job creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    pub acquired_at_ms: u64,
    pub heartbeat_at_ms: u64,
    pub ttl_ms: u64,
}

impl LockRecord {
    pub fn new(scope: LockScope, pid: u32, ttl_ms: u64, now_ms: u64) -> Self {
        Self {
            scope,
            pid,
            job_id: None,
            acquired_at_ms: now_ms,
            heartbeat_at_ms: now_ms,
            ttl_ms,
        }
    }

    /// Stale when the holder is dead or the TTL elapsed since the
    /// last heartbeat. `holder_alive` is passed in so the check stays
    /// a pure function of its inputs.
    pub fn is_stale(&self, now_ms: u64, holder_alive: bool) -> bool {
        if !holder_alive {
            return true;
        }
        now_ms.saturating_sub(self.heartbeat_at_ms) > self.ttl_ms
    }

    /// Refresh the heartbeat timestamp.
    pub fn touch(&mut self, now_ms: u64) {
        self.heartbeat_at_ms = now_ms;
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
