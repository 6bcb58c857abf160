// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup reconciliation of durable state against live processes.
//!
//! After a crash the store can claim jobs running and previews alive
//! that no longer are. The sweep walks every record, checks the pids
//! it finds, and settles anything stale. Restarting dead previews is
//! left to the health loop; the sweep only records the truth.

use crate::env::EngineConfig;
use kiln_core::{pid_alive, Clock, JobId, LockScope};
use kiln_store::{JobStore, LockManager, PreviewStore};

/// What one sweep pass settled.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SweepReport {
    pub jobs_failed: Vec<JobId>,
    pub previews_stopped: Vec<(String, String)>,
    pub locks_cleared: Vec<LockScope>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.jobs_failed.is_empty()
            && self.previews_stopped.is_empty()
            && self.locks_cleared.is_empty()
    }
}

#[derive(Clone)]
pub struct RecoverySweep<C: Clock> {
    config: EngineConfig,
    clock: C,
    jobs: JobStore<C>,
    previews: PreviewStore<C>,
    locks: LockManager<C>,
}

impl<C: Clock> RecoverySweep<C> {
    pub fn new(
        config: EngineConfig,
        clock: C,
        jobs: JobStore<C>,
        previews: PreviewStore<C>,
        locks: LockManager<C>,
    ) -> Self {
        Self { config, clock, jobs, previews, locks }
    }

    /// One full pass. Per-record failures are logged and skipped so a
    /// single bad record never blocks the rest; on a consistent store
    /// a second pass reports nothing.
    pub fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        self.sweep_jobs(&mut report);
        self.sweep_previews(&mut report);
        self.sweep_locks(&mut report);

        if !report.is_clean() {
            tracing::info!(
                jobs_failed = report.jobs_failed.len(),
                previews_stopped = report.previews_stopped.len(),
                locks_cleared = report.locks_cleared.len(),
                "recovery sweep settled stale state"
            );
        }
        report
    }

    fn sweep_jobs(&self, report: &mut SweepReport) {
        let now = self.clock.epoch_ms();
        for job in self.jobs.all() {
            if !job.is_active() {
                continue;
            }
            let reason = match job.pid {
                Some(pid) if !pid_alive(pid) => "stale-pid",
                None if job.age_ms(now) > self.config.job_staleness_ms => {
                    "timeout-never-started"
                }
                _ => continue,
            };
            match self.jobs.fail(&job.id, reason) {
                Ok(failed) => {
                    tracing::warn!(job_id = %failed.id, reason, "recovered orphaned job");
                    report.jobs_failed.push(failed.id);
                }
                Err(e) => {
                    tracing::warn!(job_id = %job.id, error = %e, "failed to settle orphaned job")
                }
            }
        }
    }

    fn sweep_previews(&self, report: &mut SweepReport) {
        for record in self.previews.all() {
            if !record.is_running() {
                continue;
            }
            if record.pid.is_some_and(pid_alive) {
                continue;
            }
            match self
                .previews
                .mark_stopped(&record.workspace_id, &record.project_id, "stale-pid")
            {
                Ok(_) => {
                    tracing::warn!(
                        workspace_id = %record.workspace_id,
                        project_id = %record.project_id,
                        "recovered dead preview record"
                    );
                    report
                        .previews_stopped
                        .push((record.workspace_id, record.project_id));
                }
                Err(e) => tracing::warn!(
                    workspace_id = %record.workspace_id,
                    project_id = %record.project_id,
                    error = %e,
                    "failed to settle dead preview record"
                ),
            }
        }
    }

    fn sweep_locks(&self, report: &mut SweepReport) {
        for (record, stale) in self.locks.scan() {
            if !stale {
                continue;
            }
            match self.locks.force_release(&record.scope) {
                Ok(()) => {
                    tracing::warn!(scope = %record.scope, stale_pid = record.pid, "cleared stale lock");
                    report.locks_cleared.push(record.scope);
                }
                Err(e) => {
                    tracing::warn!(scope = %record.scope, error = %e, "failed to clear stale lock")
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
