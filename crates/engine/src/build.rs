// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build execution under the two-level lock discipline.
//!
//! A build holds its project lock and the global build slot for its
//! whole lifetime. Lock acquisition happens before the job record
//! exists, so a rejected contender leaves no trace in the job store;
//! everything after a successful spawn is driven by a background task
//! that releases both locks when the child exits.

use crate::env::EngineConfig;
use crate::workspace::{self, WorkspaceError};
use kiln_core::{Clock, CommandKind, Job, JobId, JobKind, LockScope, Manifest, ManifestCommand, ManifestError};
use kiln_store::{JobStore, LockError, LockManager, StoreError};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("a build is already running for {workspace_id}/{project_id}")]
    AlreadyBuilding { workspace_id: String, project_id: String },

    #[error("build slot locked: {scope} held by pid {pid}")]
    Locked { scope: LockScope, pid: u32 },

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lock(#[from] LockError),
}

#[derive(Clone)]
pub struct BuildExecutor<C: Clock> {
    config: EngineConfig,
    jobs: JobStore<C>,
    locks: LockManager<C>,
}

impl<C: Clock + 'static> BuildExecutor<C> {
    pub fn new(config: EngineConfig, jobs: JobStore<C>, locks: LockManager<C>) -> Self {
        Self { config, jobs, locks }
    }

    /// Start a build and return the running job.
    ///
    /// Returns right after the child is spawned; progress is observed
    /// through the job store and the job log. A spawn failure still
    /// returns `Ok` with an already-failed job, since by then the
    /// attempt exists as a record with a log.
    pub async fn run_build(&self, workspace_id: &str, project_id: &str) -> Result<Job, BuildError> {
        if self.jobs.running_for(workspace_id, project_id).is_some() {
            return Err(BuildError::AlreadyBuilding {
                workspace_id: workspace_id.to_string(),
                project_id: project_id.to_string(),
            });
        }

        let project_scope = LockScope::project(workspace_id, project_id);
        match self.locks.acquire(project_scope.clone()) {
            Ok(_) => {}
            Err(LockError::Held { .. }) => {
                return Err(BuildError::AlreadyBuilding {
                    workspace_id: workspace_id.to_string(),
                    project_id: project_id.to_string(),
                });
            }
            Err(e) => return Err(BuildError::Lock(e)),
        }
        if let Err(acquire_err) = self.locks.acquire(LockScope::Global) {
            // Only the project lock is ours to give back here.
            if let Err(e) = self.locks.release(&project_scope, None) {
                tracing::warn!(scope = %project_scope, error = %e, "lock release failed");
            }
            return match acquire_err {
                LockError::Held { scope, pid } => Err(BuildError::Locked { scope, pid }),
                other => Err(BuildError::Lock(other)),
            };
        }

        match self.spawn_locked(workspace_id, project_id, &project_scope).await {
            Ok(job) => Ok(job),
            Err(e) => {
                self.release_both(&project_scope, None);
                Err(e)
            }
        }
    }

    /// Like [`Self::run_build`] but awaits the terminal job.
    pub async fn run_build_blocking(
        &self,
        workspace_id: &str,
        project_id: &str,
    ) -> Result<Job, BuildError> {
        let started = self.run_build(workspace_id, project_id).await?;
        if started.is_terminal() {
            return Ok(started);
        }
        loop {
            tokio::time::sleep(Duration::from_millis(25)).await;
            match self.jobs.get(&started.id) {
                Some(job) if job.is_terminal() => return Ok(job),
                Some(_) => {}
                None => {
                    return Err(BuildError::Store(StoreError::JobNotFound(started.id.clone())))
                }
            }
        }
    }

    /// Everything past lock acquisition. Errors bubble to the caller,
    /// which releases both locks; success hands lock ownership to the
    /// background completion task.
    async fn spawn_locked(
        &self,
        workspace_id: &str,
        project_id: &str,
        project_scope: &LockScope,
    ) -> Result<Job, BuildError> {
        let (root, command) = self.prepare(workspace_id, project_id)?;

        let job = self.jobs.create(workspace_id, project_id, JobKind::Build)?;
        self.locks.bind_job(project_scope, &job.id)?;
        self.locks.bind_job(&LockScope::Global, &job.id)?;

        self.jobs.append_log_line(
            &job,
            &format!(
                "build_start workspaceId={} projectId={} jobId={}",
                workspace_id, project_id, job.id
            ),
        );
        self.jobs
            .append_log(&job, &format!("$ {} {}\n", command.cmd, command.args.join(" ")));

        let mut child = match Command::new(&command.cmd)
            .args(&command.args)
            .current_dir(&root)
            .env("KILN_BUILD", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let failed = self.jobs.fail(&job.id, &format!("spawn failed: {e}"))?;
                self.jobs.append_log_line(
                    &failed,
                    &format!("build_error jobId={} error=spawn failed: {e}", failed.id),
                );
                self.release_both(project_scope, Some(&failed.id));
                tracing::warn!(job_id = %failed.id, error = %e, "build spawn failed");
                return Ok(failed);
            }
        };

        if let Some(pid) = child.id() {
            self.jobs.set_pid(&job.id, pid)?;
        }
        let running = self.jobs.mark_running(&job.id)?;
        tracing::info!(
            job_id = %running.id,
            workspace_id,
            project_id,
            pid = running.pid,
            "build started"
        );

        let out_task = child
            .stdout
            .take()
            .map(|s| tokio::spawn(copy_stream(self.jobs.clone(), running.clone(), s)));
        let err_task = child
            .stderr
            .take()
            .map(|s| tokio::spawn(copy_stream(self.jobs.clone(), running.clone(), s)));

        let executor = self.clone();
        let scope = project_scope.clone();
        let job_id = running.id.clone();
        tokio::spawn(async move {
            executor.finish(child, job_id, scope, out_task, err_task).await;
        });

        Ok(running)
    }

    fn prepare(
        &self,
        workspace_id: &str,
        project_id: &str,
    ) -> Result<(PathBuf, ManifestCommand), BuildError> {
        let root = workspace::project_root(&self.config.state_dir, workspace_id, project_id)?;
        let manifest = Manifest::load_or_default(&root, project_id)?;
        let command = manifest.resolve_command(CommandKind::Build, None)?;
        Ok((root, command))
    }

    /// Wait for the child while refreshing both lock leases, then
    /// record the terminal state and release the locks.
    async fn finish(
        &self,
        mut child: Child,
        job_id: JobId,
        project_scope: LockScope,
        out_task: Option<JoinHandle<()>>,
        err_task: Option<JoinHandle<()>>,
    ) {
        let mut heartbeat =
            tokio::time::interval(Duration::from_millis(self.config.lock_heartbeat_ms.max(1)));
        heartbeat.tick().await;

        let status = loop {
            tokio::select! {
                status = child.wait() => break status,
                _ = heartbeat.tick() => {
                    for scope in [&project_scope, &LockScope::Global] {
                        if let Err(e) = self.locks.heartbeat(scope) {
                            tracing::warn!(scope = %scope, error = %e, "lock heartbeat failed");
                        }
                    }
                }
            }
        };

        // Drain remaining child output before writing the footer.
        if let Some(task) = out_task {
            let _ = task.await;
        }
        if let Some(task) = err_task {
            let _ = task.await;
        }

        match status {
            Ok(status) => match status.code() {
                Some(code) => match self.jobs.complete(&job_id, code) {
                    Ok(done) => {
                        self.jobs.append_log_line(
                            &done,
                            &format!(
                                "build_end jobId={} status={} exitCode={}",
                                done.id, done.status, code
                            ),
                        );
                        tracing::info!(job_id = %done.id, status = %done.status, code, "build finished");
                    }
                    Err(e) => {
                        tracing::warn!(job_id = %job_id, error = %e, "failed to record build exit")
                    }
                },
                None => {
                    let reason = match status.signal() {
                        Some(signal) => format!("signal-{signal}"),
                        None => "killed".to_string(),
                    };
                    self.fail_with_log(&job_id, &reason);
                }
            },
            Err(e) => self.fail_with_log(&job_id, &format!("wait failed: {e}")),
        }

        self.release_both(&project_scope, Some(&job_id));
    }

    fn fail_with_log(&self, job_id: &JobId, reason: &str) {
        match self.jobs.fail(job_id, reason) {
            Ok(failed) => self.jobs.append_log_line(
                &failed,
                &format!("build_error jobId={} error={}", failed.id, reason),
            ),
            Err(e) => tracing::warn!(job_id = %job_id, error = %e, "failed to record build failure"),
        }
    }

    fn release_both(&self, project_scope: &LockScope, job_id: Option<&JobId>) {
        for scope in [project_scope, &LockScope::Global] {
            if let Err(e) = self.locks.release(scope, job_id) {
                tracing::warn!(scope = %scope, error = %e, "lock release failed");
            }
        }
    }
}

/// Tail one child stream into the job log. Interleaving between
/// stdout and stderr is best-effort, within each stream order is
/// preserved and bytes are appended verbatim (lossily decoded).
async fn copy_stream<C, R>(jobs: JobStore<C>, job: Job, mut reader: R)
where
    C: Clock + 'static,
    R: AsyncReadExt + Unpin,
{
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => jobs.append_log(&job, &String::from_utf8_lossy(&buf[..n])),
        }
    }
}

#[cfg(test)]
#[path = "build_tests.rs"]
mod tests;
