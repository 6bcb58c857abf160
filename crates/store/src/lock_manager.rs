// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Advisory lock files with pid liveness and heartbeat TTL.
//!
//! One JSON lock file per scope under `locks/`. A lock is held while
//! its file exists and its record is live; a record whose holder pid
//! is dead or whose TTL elapsed since the last heartbeat is stale and
//! is reclaimed silently by the next acquirer.

use crate::fsutil::{read_json_opt, write_json_atomic};
use crate::paths;
use kiln_core::{pid_alive, Clock, JobId, LockRecord, LockScope};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("{scope} is locked by pid {pid}")]
    Held { scope: LockScope, pid: u32 },

    #[error("{scope} is not held by this process")]
    NotHolder { scope: LockScope },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone)]
pub struct LockManager<C: Clock> {
    state_dir: PathBuf,
    clock: C,
    ttl_ms: u64,
    guard: Arc<Mutex<()>>,
}

impl<C: Clock> LockManager<C> {
    pub fn new(state_dir: PathBuf, clock: C, ttl_ms: u64) -> Self {
        Self { state_dir, clock, ttl_ms, guard: Arc::new(Mutex::new(())) }
    }

    /// Try to take the scope for the current process.
    ///
    /// A live existing record rejects immediately (no queueing); a
    /// stale one is overwritten. The caller binds a job id right
    /// after creating the job via [`Self::bind_job`].
    pub fn acquire(&self, scope: LockScope) -> Result<LockRecord, LockError> {
        let _held = self.guard.lock();
        let now = self.clock.epoch_ms();

        if let Some(existing) = self.read(&scope) {
            if !existing.is_stale(now, pid_alive(existing.pid)) {
                return Err(LockError::Held { scope, pid: existing.pid });
            }
            tracing::warn!(
                scope = %scope,
                stale_pid = existing.pid,
                "reclaiming stale lock"
            );
        }

        let record = LockRecord::new(scope.clone(), std::process::id(), self.ttl_ms, now);
        write_json_atomic(&paths::lock_path(&self.state_dir, &scope), &record)?;
        Ok(record)
    }

    /// Attach the job id to a lock held by this process.
    pub fn bind_job(&self, scope: &LockScope, job_id: &JobId) -> Result<(), LockError> {
        let _held = self.guard.lock();
        let mut record = self.held_by_self(scope)?;
        record.job_id = Some(job_id.clone());
        write_json_atomic(&paths::lock_path(&self.state_dir, scope), &record)?;
        Ok(())
    }

    /// Refresh the heartbeat on a lock held by this process.
    pub fn heartbeat(&self, scope: &LockScope) -> Result<(), LockError> {
        let _held = self.guard.lock();
        let mut record = self.held_by_self(scope)?;
        record.touch(self.clock.epoch_ms());
        write_json_atomic(&paths::lock_path(&self.state_dir, scope), &record)?;
        Ok(())
    }

    /// Release a lock held by this process.
    ///
    /// Releasing a scope with no lock file is a no-op and a stale
    /// foreign record is swept, but a lock held by another live
    /// process is refused. When `job_id` is given and the record is
    /// bound to a different job, the lock was reclaimed by a newer
    /// acquirer in this same process; releasing would steal it out
    /// from under them, so the call is a silent no-op instead.
    pub fn release(&self, scope: &LockScope, job_id: Option<&JobId>) -> Result<(), LockError> {
        let _held = self.guard.lock();
        match self.read(scope) {
            None => Ok(()),
            Some(record) => {
                if record.is_stale(self.clock.epoch_ms(), pid_alive(record.pid)) {
                    return self.remove(scope);
                }
                if record.pid != std::process::id() {
                    return Err(LockError::NotHolder { scope: scope.clone() });
                }
                if let (Some(expected), Some(bound)) = (job_id, record.job_id.as_ref()) {
                    if expected != bound {
                        return Ok(());
                    }
                }
                self.remove(scope)
            }
        }
    }

    /// Delete the lock file regardless of holder. Recovery only.
    pub fn force_release(&self, scope: &LockScope) -> Result<(), LockError> {
        let _held = self.guard.lock();
        self.remove(scope)
    }

    /// Current record for the scope, live or stale.
    pub fn inspect(&self, scope: &LockScope) -> Option<LockRecord> {
        self.read(scope)
    }

    /// Every lock file currently on disk, with its staleness verdict.
    pub fn scan(&self) -> Vec<(LockRecord, bool)> {
        let now = self.clock.epoch_ms();
        let dir = paths::locks_dir(&self.state_dir);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Vec::new();
        };
        let mut found = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let is_lock = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".lock.json"));
            if !is_lock {
                // Skip orphaned temp files from an interrupted publish.
                continue;
            }
            let Some(record) = read_json_opt::<LockRecord>(&path) else {
                continue;
            };
            let stale = record.is_stale(now, pid_alive(record.pid));
            found.push((record, stale));
        }
        found
    }

    fn held_by_self(&self, scope: &LockScope) -> Result<LockRecord, LockError> {
        let record = self
            .read(scope)
            .filter(|r| r.pid == std::process::id())
            .ok_or_else(|| LockError::NotHolder { scope: scope.clone() })?;
        Ok(record)
    }

    fn read(&self, scope: &LockScope) -> Option<LockRecord> {
        read_json_opt(&paths::lock_path(&self.state_dir, scope))
    }

    fn remove(&self, scope: &LockScope) -> Result<(), LockError> {
        match std::fs::remove_file(paths::lock_path(&self.state_dir, scope)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LockError::Io(e)),
        }
    }
}

#[cfg(test)]
#[path = "lock_manager_tests.rs"]
mod tests;
