// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared spec fixtures.

pub use kiln_core::{
    pid_alive, JobKind, JobStatus, LockRecord, LockScope, PreviewStatus, SystemClock,
    MANIFEST_FILE,
};
pub use kiln_engine::{
    BuildError, Engine, EngineConfig, LogSource, PortRange, PreviewError, StreamEvent,
};
pub use std::time::Duration;
pub use tokio_util::sync::CancellationToken;

/// Engine over a throwaway state directory, tuned for specs: no
/// reachability probe (stand-in dev servers never listen), short stop
/// grace, fast stream ticks.
pub struct Harness {
    _state: tempfile::TempDir,
    pub engine: Engine<SystemClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(tweak: impl FnOnce(&mut EngineConfig)) -> Self {
        let state = tempfile::TempDir::new().expect("state dir");
        let mut config = EngineConfig::for_state_dir(state.path());
        config.preview_reachability_ms = 0;
        config.stop_grace_ms = 1_000;
        config.stream_tick_ms = 20;
        config.stream_ping_ms = 200;
        tweak(&mut config);
        Self { _state: state, engine: Engine::new(config, SystemClock) }
    }

    pub fn state_dir(&self) -> std::path::PathBuf {
        self.engine.config().state_dir.clone()
    }

    /// Create a project directory with a manifest running the given
    /// shell snippets.
    pub fn project(&self, ws: &str, proj: &str, build: Option<&str>, preview: Option<&str>) {
        let root = self
            .state_dir()
            .join("workspaces")
            .join(ws)
            .join("projects")
            .join(proj);
        std::fs::create_dir_all(&root).expect("project root");

        let command = |script: &str| {
            serde_json::json!({ "cmd": "/bin/sh", "args": ["-c", script] })
        };
        let mut commands = serde_json::Map::new();
        if let Some(script) = build {
            commands.insert("build".into(), command(script));
        }
        if let Some(script) = preview {
            commands.insert("preview".into(), command(script));
        }
        let manifest = serde_json::json!({
            "name": proj,
            "framework": "vite",
            "commands": commands,
        });
        std::fs::write(root.join(MANIFEST_FILE), manifest.to_string()).expect("manifest");
    }

    /// Plant a lock record owned by an arbitrary pid, with a fresh
    /// heartbeat so staleness comes from the pid alone.
    pub fn plant_lock(&self, scope: &LockScope, pid: u32) {
        let now = kiln_core::Clock::epoch_ms(&SystemClock);
        let record = LockRecord::new(scope.clone(), pid, 600_000, now);
        let path = self.state_dir().join("locks").join(scope.file_name());
        std::fs::create_dir_all(path.parent().expect("locks dir")).expect("mkdir");
        std::fs::write(&path, serde_json::to_string(&record).expect("json")).expect("write");
    }
}

/// Pid of a process that has already exited and been reaped.
pub fn dead_pid() -> u32 {
    let mut child = std::process::Command::new("/bin/sh")
        .args(["-c", "exit 0"])
        .spawn()
        .expect("spawn");
    let pid = child.id();
    child.wait().expect("wait");
    pid
}

/// Poll `cond` until it holds or `max_ms` elapses.
pub async fn wait_for(max_ms: u64, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Duration::from_millis(max_ms);
    let poll = Duration::from_millis(20);
    let mut waited = Duration::ZERO;
    loop {
        if cond() {
            return true;
        }
        if waited >= deadline {
            return false;
        }
        tokio::time::sleep(poll).await;
        waited += poll;
    }
}
