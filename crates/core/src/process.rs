// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OS process liveness probe.

use nix::sys::signal::kill;
use nix::unistd::Pid;

/// Check whether a pid refers to a live process by sending signal 0.
///
/// Liveness is always re-derived from the OS rather than trusted from
/// in-memory maps, so a host restart does not lose the ability to
/// detect "still running". Never errors: probe failures (ESRCH,
/// EPERM on foreign processes we could never have spawned) read as
/// not-alive.
pub fn pid_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    kill(Pid::from_raw(pid), None).is_ok()
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
