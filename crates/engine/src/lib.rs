// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! kiln-engine: build execution, preview supervision and recovery.
//!
//! Components share one [`kiln_store::JobStore`], one
//! [`kiln_store::PreviewStore`] and one [`kiln_store::LockManager`];
//! [`Engine::new`] is the single assembly point that guarantees this,
//! so every clone serializes through the same store mutexes.

pub mod build;
pub mod env;
pub mod events;
pub mod ports;
pub mod preview;
pub mod recovery;
pub mod status;
pub mod workspace;

pub use build::{BuildError, BuildExecutor};
pub use env::EngineConfig;
pub use events::{EventStream, LogSource, StreamEvent};
pub use ports::{PortError, PortRange};
pub use preview::{PreviewError, PreviewSupervisor};
pub use recovery::{RecoverySweep, SweepReport};
pub use status::ProjectState;
pub use workspace::WorkspaceError;

use kiln_core::Clock;
use kiln_store::{JobStore, LockManager, PreviewStore};

/// Fully assembled orchestration core over one state directory.
#[derive(Clone)]
pub struct Engine<C: Clock> {
    pub jobs: JobStore<C>,
    pub previews: PreviewStore<C>,
    pub locks: LockManager<C>,
    pub builds: BuildExecutor<C>,
    pub preview: PreviewSupervisor<C>,
    pub events: EventStream<C>,
    pub recovery: RecoverySweep<C>,
    config: EngineConfig,
}

impl<C: Clock + 'static> Engine<C> {
    pub fn new(config: EngineConfig, clock: C) -> Self {
        let jobs = JobStore::new(config.state_dir.clone(), clock.clone());
        let previews = PreviewStore::new(config.state_dir.clone(), clock.clone());
        let locks = LockManager::new(config.state_dir.clone(), clock.clone(), config.lock_ttl_ms);

        let builds = BuildExecutor::new(config.clone(), jobs.clone(), locks.clone());
        let preview = PreviewSupervisor::new(config.clone(), clock.clone(), previews.clone());
        let events = EventStream::new(config.clone(), jobs.clone(), previews.clone());
        let recovery = RecoverySweep::new(
            config.clone(),
            clock.clone(),
            jobs.clone(),
            previews.clone(),
            locks.clone(),
        );

        Self { jobs, previews, locks, builds, preview, events, recovery, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Aggregated read-only view of one project.
    pub fn project_state(&self, workspace_id: &str, project_id: &str) -> ProjectState {
        status::project_state(&self.jobs, &self.previews, workspace_id, project_id)
    }

    /// Tail of the latest build log for the project.
    pub fn latest_log_tail(&self, workspace_id: &str, project_id: &str, max: usize) -> Vec<String> {
        status::latest_log_tail(&self.jobs, workspace_id, project_id, max)
    }
}
