// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Preview dev-server supervision.
//!
//! Preview children are spawned into their own process group so a
//! stop can take down the whole npm/node tree with one `killpg`.
//! Child handles are retained for reaping; a child that exits on its
//! own becomes a zombie until the next health tick waits on it.

use crate::env::EngineConfig;
use crate::ports::{self, PortError};
use crate::workspace::{self, WorkspaceError};
use kiln_core::{pid_alive, Clock, CommandKind, Manifest, ManifestError, PreviewRecord};
use kiln_store::{paths, tail_lines, PreviewStore, StoreError};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("no preview record for {workspace_id}/{project_id}")]
    NotFound { workspace_id: String, project_id: String },

    #[error("preview for {workspace_id}/{project_id} not reachable on port {port} within {timeout_ms}ms")]
    NotReachable {
        workspace_id: String,
        project_id: String,
        port: u16,
        timeout_ms: u64,
    },

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to spawn preview: {0}")]
    Spawn(#[from] std::io::Error),
}

type ProjectKey = (String, String);

#[derive(Clone)]
pub struct PreviewSupervisor<C: Clock> {
    config: EngineConfig,
    clock: C,
    previews: PreviewStore<C>,
    children: Arc<Mutex<HashMap<ProjectKey, Child>>>,
    // Serializes check-allocate-spawn-publish across concurrent
    // starts; a port reservation is invisible to other tasks until
    // the record is upserted.
    start_guard: Arc<Mutex<()>>,
}

impl<C: Clock + 'static> PreviewSupervisor<C> {
    pub fn new(config: EngineConfig, clock: C, previews: PreviewStore<C>) -> Self {
        Self {
            config,
            clock,
            previews,
            children: Arc::new(Mutex::new(HashMap::new())),
            start_guard: Arc::new(Mutex::new(())),
        }
    }

    /// Start the project's preview, or return the existing one.
    ///
    /// Idempotent: a running record whose pid is alive is returned
    /// unchanged. Otherwise a port is allocated, the dev server is
    /// spawned detached with its output appended to the preview log,
    /// and the record is persisted before reachability is probed.
    /// A reachability timeout marks the record failed but leaves the
    /// process running: first compiles can legitimately take longer
    /// than the probe window, and an explicit stop can still target
    /// the recorded pid.
    pub async fn start(
        &self,
        workspace_id: &str,
        project_id: &str,
    ) -> Result<PreviewRecord, PreviewError> {
        let (record, spawned) = self.start_locked(workspace_id, project_id)?;

        let timeout_ms = self.config.preview_reachability_ms;
        let port = match record.port {
            Some(port) => port,
            None => return Ok(record),
        };
        if !spawned || timeout_ms == 0 || self.wait_reachable(port, timeout_ms).await {
            return Ok(record);
        }

        let tail = record
            .log_path
            .as_deref()
            .map(|p| tail_lines(p, 5).join(" | "))
            .unwrap_or_default();
        self.previews.mark_failed(
            workspace_id,
            project_id,
            &format!("not reachable within {timeout_ms}ms; log tail: {tail}"),
        )?;
        tracing::warn!(workspace_id, project_id, port, "preview did not become reachable");
        Err(PreviewError::NotReachable {
            workspace_id: workspace_id.to_string(),
            project_id: project_id.to_string(),
            port,
            timeout_ms,
        })
    }

    /// The check-allocate-spawn-publish section of [`Self::start`],
    /// serialized under the start guard. No awaits inside: the guard
    /// is never held across a suspension point. Returns the record
    /// and whether this call spawned it.
    fn start_locked(
        &self,
        workspace_id: &str,
        project_id: &str,
    ) -> Result<(PreviewRecord, bool), PreviewError> {
        let _serialize = self.start_guard.lock();

        if let Some(existing) = self.previews.get(workspace_id, project_id) {
            if existing.is_running() && existing.pid.is_some_and(pid_alive) {
                return Ok((existing, false));
            }
        }

        let root = workspace::project_root(&self.config.state_dir, workspace_id, project_id)?;
        let port = ports::allocate(
            self.config.port_range,
            &ports::reserved_ports(&self.previews.all()),
        )?;
        let manifest = Manifest::load_or_default(&root, project_id)?;
        let command = manifest.resolve_command(CommandKind::Preview, Some(port))?;

        let log_path = paths::preview_log_path(&self.config.state_dir, workspace_id, project_id);
        append_line(
            &log_path,
            &format!(
                "preview_start workspaceId={} projectId={} port={}",
                workspace_id, project_id, port
            ),
        );

        let child = self.spawn_detached(&command.cmd, &command.args, &root, port, &log_path)?;
        let pid = child.id();
        let record = PreviewRecord::running(
            workspace_id,
            project_id,
            pid,
            port,
            self.config.preview_url(port),
            log_path,
            self.clock.epoch_ms(),
        );
        self.previews.upsert(record.clone())?;
        self.retain_child(workspace_id, project_id, child);
        tracing::info!(workspace_id, project_id, pid, port, "preview started");

        Ok((record, true))
    }

    /// Stop the project's preview process group and mark the record
    /// stopped. Stopping an already stopped record is a no-op.
    pub async fn stop(
        &self,
        workspace_id: &str,
        project_id: &str,
    ) -> Result<PreviewRecord, PreviewError> {
        let record = self.previews.get(workspace_id, project_id).ok_or_else(|| {
            PreviewError::NotFound {
                workspace_id: workspace_id.to_string(),
                project_id: project_id.to_string(),
            }
        })?;

        if let Some(pid) = record.pid {
            if pid_alive(pid) {
                signal_group(pid, Signal::SIGTERM);
                let grace = Duration::from_millis(self.config.stop_grace_ms);
                if !self.wait_group_exit(workspace_id, project_id, pid, grace).await {
                    tracing::warn!(pid, "preview ignored SIGTERM, escalating to SIGKILL");
                    signal_group(pid, Signal::SIGKILL);
                }
            }
        }
        self.reap_child(workspace_id, project_id).await;

        let stopped = self
            .previews
            .mark_stopped(workspace_id, project_id, "stopped")?
            .unwrap_or(record);
        tracing::info!(workspace_id, project_id, "preview stopped");
        Ok(stopped)
    }

    /// One self-healing pass: reap exited children, then restart any
    /// running record whose process has died. Per-record failures are
    /// logged and never abort the pass.
    pub async fn health_tick(&self) {
        self.reap_exited();

        for record in self.previews.all() {
            if !record.is_running() {
                continue;
            }
            if record.pid.is_some_and(pid_alive) {
                continue;
            }

            let (ws, proj) = (record.workspace_id.clone(), record.project_id.clone());
            tracing::warn!(
                workspace_id = %ws,
                project_id = %proj,
                stale_pid = record.pid,
                "preview process died, restarting"
            );
            self.reap_child(&ws, &proj).await;
            if let Err(e) = self.previews.mark_stopped(&ws, &proj, "stale-pid") {
                tracing::warn!(workspace_id = %ws, project_id = %proj, error = %e, "failed to mark stale preview");
                continue;
            }
            if let Err(e) = self.start(&ws, &proj).await {
                tracing::warn!(workspace_id = %ws, project_id = %proj, error = %e, "preview restart failed");
            }
        }
    }

    /// Periodic [`Self::health_tick`] until cancelled.
    pub fn spawn_health_loop(
        &self,
        period: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let supervisor = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => supervisor.health_tick().await,
                }
            }
        })
    }

    fn spawn_detached(
        &self,
        cmd: &str,
        args: &[String],
        root: &Path,
        port: u16,
        log_path: &Path,
    ) -> Result<Child, PreviewError> {
        let log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;
        let log_err = log.try_clone()?;

        let child = Command::new(cmd)
            .args(args)
            .current_dir(root)
            .env("PORT", port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .process_group(0)
            .spawn()?;
        Ok(child)
    }

    /// Wait for the group leader to exit, up to `deadline`.
    ///
    /// A child we spawned lingers as a zombie until waited on, so a
    /// retained handle is polled with `try_wait` instead of a signal
    /// probe. An adopted pid (spawned by a previous supervisor
    /// process) has been reparented and gets reaped externally, so
    /// liveness probing is accurate there.
    async fn wait_group_exit(
        &self,
        workspace_id: &str,
        project_id: &str,
        pid: u32,
        deadline: Duration,
    ) -> bool {
        let key = (workspace_id.to_string(), project_id.to_string());
        let poll = Duration::from_millis(50);
        let mut waited = Duration::ZERO;
        loop {
            let exited = match self.children.lock().get_mut(&key) {
                Some(child) => matches!(child.try_wait(), Ok(Some(_))),
                None => !pid_alive(pid),
            };
            if exited {
                return true;
            }
            if waited >= deadline {
                return false;
            }
            tokio::time::sleep(poll).await;
            waited += poll;
        }
    }

    fn retain_child(&self, workspace_id: &str, project_id: &str, child: Child) {
        let key = (workspace_id.to_string(), project_id.to_string());
        if let Some(mut replaced) = self.children.lock().insert(key, child) {
            // A previous child for this project was never reaped.
            let _ = replaced.try_wait();
        }
    }

    /// Poll the retained handle until the process is collected, so it
    /// does not linger as a zombie after a stop. Callers invoke this
    /// once the process is already dead or signalled; a child that
    /// somehow still runs after the polling budget goes back into the
    /// map for [`Self::reap_exited`] to collect later.
    async fn reap_child(&self, workspace_id: &str, project_id: &str) {
        let key = (workspace_id.to_string(), project_id.to_string());
        let Some(mut child) = self.children.lock().remove(&key) else {
            return;
        };
        for _ in 0..20 {
            match child.try_wait() {
                Ok(Some(_)) | Err(_) => return,
                Ok(None) => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
        self.children.lock().insert(key, child);
    }

    fn reap_exited(&self) {
        let mut children = self.children.lock();
        children.retain(|_, child| match child.try_wait() {
            Ok(Some(_)) => false,
            Ok(None) => true,
            Err(_) => false,
        });
    }

    async fn wait_reachable(&self, port: u16, timeout_ms: u64) -> bool {
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let deadline = Duration::from_millis(timeout_ms);
        let poll = Duration::from_millis(100);
        let mut waited = Duration::ZERO;
        loop {
            let attempt = tokio::time::timeout(poll, tokio::net::TcpStream::connect(addr)).await;
            if matches!(attempt, Ok(Ok(_))) {
                return true;
            }
            if waited >= deadline {
                return false;
            }
            tokio::time::sleep(poll).await;
            waited += poll;
        }
    }
}

fn signal_group(pid: u32, signal: Signal) {
    if let Err(e) = killpg(Pid::from_raw(pid as i32), signal) {
        // ESRCH just means the group is already gone.
        if e != nix::errno::Errno::ESRCH {
            tracing::warn!(pid, %signal, error = %e, "failed to signal preview group");
        }
    }
}

fn append_line(path: &Path, line: &str) {
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
        let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        writeln!(file, "[{}] {}", ts, line)
    };
    if let Err(e) = write() {
        tracing::warn!(path = %path.display(), error = %e, "failed to append preview log");
    }
}

#[cfg(test)]
#[path = "preview_tests.rs"]
mod tests;
