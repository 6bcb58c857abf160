// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable registry of job records.

use crate::fsutil::{read_json_opt, write_json_atomic};
use crate::paths;
use kiln_core::{pid_alive, Clock, Job, JobId, JobKind};
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("job not found: {0}")]
    JobNotFound(JobId),
}

/// File-backed job collection serialized behind a per-store mutex.
///
/// Mutation is read-all → mutate → write-all with an atomic rename
/// publish, so concurrent routes within the process cannot lose
/// updates and a crash mid-write cannot corrupt the collection.
#[derive(Clone)]
pub struct JobStore<C: Clock> {
    state_dir: PathBuf,
    clock: C,
    guard: Arc<Mutex<()>>,
}

impl<C: Clock> JobStore<C> {
    pub fn new(state_dir: PathBuf, clock: C) -> Self {
        Self { state_dir, clock, guard: Arc::new(Mutex::new(())) }
    }

    /// Create a fresh pending job and persist it.
    pub fn create(
        &self,
        workspace_id: &str,
        project_id: &str,
        kind: JobKind,
    ) -> Result<Job, StoreError> {
        let _held = self.guard.lock();
        let mut jobs = self.read_all();

        let mut job = Job::new(
            workspace_id,
            project_id,
            kind,
            PathBuf::new(),
            self.clock.epoch_ms(),
        );
        job.log_path = paths::job_log_path(&self.state_dir, workspace_id, project_id, &job.id);

        jobs.push(job.clone());
        self.write_all(&jobs)?;
        Ok(job)
    }

    pub fn set_pid(&self, id: &JobId, pid: u32) -> Result<Job, StoreError> {
        self.update(id, |job| job.set_pid(pid))
    }

    pub fn mark_running(&self, id: &JobId) -> Result<Job, StoreError> {
        let now = self.clock.epoch_ms();
        self.update(id, |job| job.mark_running(now))
    }

    pub fn complete(&self, id: &JobId, exit_code: i32) -> Result<Job, StoreError> {
        let now = self.clock.epoch_ms();
        self.update(id, |job| job.complete(exit_code, now))
    }

    pub fn fail(&self, id: &JobId, reason: &str) -> Result<Job, StoreError> {
        let now = self.clock.epoch_ms();
        self.update(id, |job| job.fail(reason, now))
    }

    /// Append text to the job's dedicated log file.
    ///
    /// Open-append-write-close per call; a crash loses at most the
    /// last unflushed write and never corrupts prior content.
    /// Failures are swallowed — logging must never abort a build.
    pub fn append_log(&self, job: &Job, text: &str) {
        if let Err(e) = append_to(&job.log_path, text) {
            tracing::warn!(job_id = %job.id, error = %e, "failed to append job log");
        }
    }

    /// Timestamped marker line, used for build start/end/error headers.
    pub fn append_log_line(&self, job: &Job, line: &str) {
        let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        self.append_log(job, &format!("[{}] {}\n", ts, line));
    }

    pub fn get(&self, id: &JobId) -> Option<Job> {
        self.read_all().into_iter().find(|j| &j.id == id)
    }

    /// All jobs for a project, in creation order.
    pub fn jobs_for(&self, workspace_id: &str, project_id: &str) -> Vec<Job> {
        self.read_all()
            .into_iter()
            .filter(|j| j.workspace_id == workspace_id && j.project_id == project_id)
            .collect()
    }

    /// Most recently created job for a project.
    pub fn latest_for(&self, workspace_id: &str, project_id: &str) -> Option<Job> {
        self.jobs_for(workspace_id, project_id).into_iter().last()
    }

    /// The latest job, but only if it is genuinely still running:
    /// active status AND (when a pid was recorded) the pid is alive.
    /// A recorded-but-dead pid yields `None`, which is what lets a
    /// build be retried after a crash without a blocking
    /// reconciliation pass.
    pub fn running_for(&self, workspace_id: &str, project_id: &str) -> Option<Job> {
        let job = self.latest_for(workspace_id, project_id)?;
        if !job.is_active() {
            return None;
        }
        match job.pid {
            Some(pid) if !pid_alive(pid) => None,
            _ => Some(job),
        }
    }

    /// Snapshot of the whole collection.
    pub fn all(&self) -> Vec<Job> {
        self.read_all()
    }

    fn update(&self, id: &JobId, f: impl FnOnce(&mut Job)) -> Result<Job, StoreError> {
        let _held = self.guard.lock();
        let mut jobs = self.read_all();
        let job = jobs
            .iter_mut()
            .find(|j| &j.id == id)
            .ok_or_else(|| StoreError::JobNotFound(id.clone()))?;
        f(job);
        let updated = job.clone();
        self.write_all(&jobs)?;
        Ok(updated)
    }

    fn read_all(&self) -> Vec<Job> {
        read_json_opt(&paths::jobs_file(&self.state_dir)).unwrap_or_default()
    }

    fn write_all(&self, jobs: &[Job]) -> Result<(), StoreError> {
        write_json_atomic(&paths::jobs_file(&self.state_dir), &jobs)?;
        Ok(())
    }
}

fn append_to(path: &std::path::Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(text.as_bytes())
}

#[cfg(test)]
#[path = "job_store_tests.rs"]
mod tests;
