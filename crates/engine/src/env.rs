// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration from environment variables.
//!
//! Every knob has a `KILN_*` override; the defaults match the
//! production tunings (10 min lock lease, 30 s preview reachability,
//! 15 min never-started staleness, 500 ms stream tick).

use crate::ports::PortRange;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root of all durable state (collections, logs, workspaces).
    pub state_dir: PathBuf,
    /// Candidate preview ports, inclusive.
    pub port_range: PortRange,
    /// Host used when building preview URLs.
    pub preview_host: String,
    /// Lock lease length; leases past this without a heartbeat are stale.
    pub lock_ttl_ms: u64,
    /// Heartbeat refresh period while a build runs.
    pub lock_heartbeat_ms: u64,
    /// How long a freshly spawned preview gets to accept TCP before
    /// its record is marked failed. Zero disables the probe.
    pub preview_reachability_ms: u64,
    /// Age past which a pending job that never recorded a pid is
    /// declared dead by the recovery sweep.
    pub job_staleness_ms: u64,
    /// Event stream poll period.
    pub stream_tick_ms: u64,
    /// Keep-alive ping period on the event stream.
    pub stream_ping_ms: u64,
    /// Grace between SIGTERM and SIGKILL when stopping a preview.
    pub stop_grace_ms: u64,
}

impl EngineConfig {
    /// Defaults over an explicit state directory.
    pub fn for_state_dir(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            port_range: PortRange::default(),
            preview_host: "localhost".to_string(),
            lock_ttl_ms: 600_000,
            lock_heartbeat_ms: 60_000,
            preview_reachability_ms: 30_000,
            job_staleness_ms: 900_000,
            stream_tick_ms: 500,
            stream_ping_ms: 15_000,
            stop_grace_ms: 5_000,
        }
    }

    /// Read configuration from the process environment.
    ///
    /// State dir resolution: `KILN_STATE_DIR`, else
    /// `$XDG_STATE_HOME/kiln`, else `$HOME/.local/state/kiln`.
    pub fn from_env() -> Self {
        let mut config = Self::for_state_dir(state_dir_from_env());
        if let Some(range) = env_var("KILN_PORT_RANGE").and_then(|v| v.parse().ok()) {
            config.port_range = range;
        }
        if let Some(host) = env_var("KILN_PREVIEW_HOST") {
            config.preview_host = host;
        }
        config.lock_ttl_ms = env_ms("KILN_LOCK_TTL_MS", config.lock_ttl_ms);
        config.lock_heartbeat_ms = env_ms("KILN_LOCK_HEARTBEAT_MS", config.lock_heartbeat_ms);
        config.preview_reachability_ms =
            env_ms("KILN_PREVIEW_REACHABILITY_MS", config.preview_reachability_ms);
        config.job_staleness_ms = env_ms("KILN_JOB_STALENESS_MS", config.job_staleness_ms);
        config.stream_tick_ms = env_ms("KILN_STREAM_TICK_MS", config.stream_tick_ms);
        config.stream_ping_ms = env_ms("KILN_STREAM_PING_MS", config.stream_ping_ms);
        config.stop_grace_ms = env_ms("KILN_STOP_GRACE_MS", config.stop_grace_ms);
        config
    }

    /// Preview URL for an allocated port.
    pub fn preview_url(&self, port: u16) -> String {
        format!("http://{}:{}", self.preview_host, port)
    }
}

fn state_dir_from_env() -> PathBuf {
    if let Some(dir) = env_var("KILN_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Some(xdg) = env_var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("kiln");
    }
    let home = env_var("HOME").unwrap_or_else(|| ".".to_string());
    PathBuf::from(home).join(".local/state/kiln")
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_ms(name: &str, default: u64) -> u64 {
    env_var(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
