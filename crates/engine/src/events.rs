// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-project event stream for live build/preview observation.
//!
//! Each subscription runs its own poller with private byte offsets
//! into the latest build log and the preview log, so any number of
//! observers can follow the same project without coordination. The
//! payloads serialize straight to JSON for transport layers above.

use crate::env::EngineConfig;
use kiln_core::{Clock, Job, JobId, PreviewRecord};
use kiln_store::{log_read, paths, JobStore, PreviewStore};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Which log a [`StreamEvent::Log`] chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    Build,
    Preview,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// First event on every subscription.
    Hello { workspace_id: String, project_id: String },
    /// Snapshot of the latest job and the preview record, every tick.
    State {
        job: Option<Job>,
        preview: Option<PreviewRecord>,
    },
    /// Bytes appended to a log since the last tick.
    Log { source: LogSource, text: String },
    /// Keep-alive for intermediaries that drop quiet connections.
    Ping,
}

#[derive(Clone)]
pub struct EventStream<C: Clock> {
    config: EngineConfig,
    jobs: JobStore<C>,
    previews: PreviewStore<C>,
}

impl<C: Clock + 'static> EventStream<C> {
    pub fn new(config: EngineConfig, jobs: JobStore<C>, previews: PreviewStore<C>) -> Self {
        Self { config, jobs, previews }
    }

    /// Follow one project until the token fires or the receiver is
    /// dropped.
    pub fn subscribe(
        &self,
        workspace_id: &str,
        project_id: &str,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = mpsc::channel(64);
        let poller = Poller {
            stream: self.clone(),
            workspace_id: workspace_id.to_string(),
            project_id: project_id.to_string(),
            tracked_job: None,
            build_offset: 0,
            preview_offset: 0,
            preview_log: paths::preview_log_path(
                &self.config.state_dir,
                workspace_id,
                project_id,
            ),
        };
        tokio::spawn(poller.run(tx, cancel));
        rx
    }
}

struct Poller<C: Clock> {
    stream: EventStream<C>,
    workspace_id: String,
    project_id: String,
    tracked_job: Option<JobId>,
    build_offset: u64,
    preview_offset: u64,
    preview_log: PathBuf,
}

impl<C: Clock + 'static> Poller<C> {
    async fn run(mut self, tx: mpsc::Sender<StreamEvent>, cancel: CancellationToken) {
        let hello = StreamEvent::Hello {
            workspace_id: self.workspace_id.clone(),
            project_id: self.project_id.clone(),
        };
        if tx.send(hello).await.is_err() {
            return;
        }

        let tick_ms = self.stream.config.stream_tick_ms.max(1);
        let ping_every = (self.stream.config.stream_ping_ms / tick_ms).max(1);
        let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
        let mut ticks: u64 = 0;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            if self.tick(&tx).await.is_err() {
                break;
            }
            ticks += 1;
            if ticks % ping_every == 0 && tx.send(StreamEvent::Ping).await.is_err() {
                break;
            }
        }
    }

    /// One poll pass. `Err` means the receiver went away.
    async fn tick(&mut self, tx: &mpsc::Sender<StreamEvent>) -> Result<(), ()> {
        let job = self
            .stream
            .jobs
            .latest_for(&self.workspace_id, &self.project_id);

        // A new build replaces the followed log mid-stream.
        if job.as_ref().map(|j| &j.id) != self.tracked_job.as_ref() {
            self.tracked_job = job.as_ref().map(|j| j.id.clone());
            self.build_offset = 0;
        }

        let preview = self
            .stream
            .previews
            .get(&self.workspace_id, &self.project_id);
        tx.send(StreamEvent::State { job: job.clone(), preview })
            .await
            .map_err(drop)?;

        if let Some(job) = &job {
            self.build_offset = self
                .forward_log(tx, LogSource::Build, &job.log_path, self.build_offset)
                .await?;
        }
        let preview_log = self.preview_log.clone();
        self.preview_offset = self
            .forward_log(tx, LogSource::Preview, &preview_log, self.preview_offset)
            .await?;
        Ok(())
    }

    async fn forward_log(
        &self,
        tx: &mpsc::Sender<StreamEvent>,
        source: LogSource,
        path: &std::path::Path,
        offset: u64,
    ) -> Result<u64, ()> {
        match log_read::read_from(path, offset) {
            Ok((text, next)) => {
                if !text.is_empty() {
                    tx.send(StreamEvent::Log { source, text }).await.map_err(drop)?;
                }
                Ok(next)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "log read failed");
                Ok(offset)
            }
        }
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
