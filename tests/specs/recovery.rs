// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash recovery specs: a state directory full of stale claims gets
//! reconciled in one sweep and normal operation resumes.

use crate::prelude::*;
use kiln_core::PreviewRecord;

#[tokio::test]
async fn sweep_settles_a_crashed_state_dir() {
    let h = Harness::new();
    h.project("ws", "web", Some("echo after-recovery"), None);

    // A job that claims to run under a pid that no longer exists.
    let job = h.engine.jobs.create("ws", "web", JobKind::Build).unwrap();
    h.engine.jobs.mark_running(&job.id).unwrap();
    h.engine.jobs.set_pid(&job.id, dead_pid()).unwrap();

    // A preview record pointing at a dead process.
    h.engine
        .previews
        .upsert(PreviewRecord::running(
            "ws",
            "web",
            dead_pid(),
            4100,
            "http://localhost:4100",
            "/tmp/preview.log".into(),
            0,
        ))
        .unwrap();

    // Locks from the crashed run.
    h.plant_lock(&LockScope::Global, dead_pid());
    h.plant_lock(&LockScope::project("ws", "web"), dead_pid());

    let report = h.engine.recovery.sweep();
    assert_eq!(report.jobs_failed, vec![job.id.clone()]);
    assert_eq!(report.previews_stopped.len(), 1);
    assert_eq!(report.locks_cleared.len(), 2);

    let settled = h.engine.jobs.get(&job.id).unwrap();
    assert_eq!(settled.status, JobStatus::Failed);
    assert_eq!(settled.error.as_deref(), Some("stale-pid"));
    assert_eq!(
        h.engine.previews.get("ws", "web").unwrap().status,
        PreviewStatus::Stopped
    );

    // Second pass finds nothing; the store is consistent now.
    assert!(h.engine.recovery.sweep().is_clean());

    // And the project can build again immediately.
    let rebuilt = h.engine.builds.run_build_blocking("ws", "web").await.unwrap();
    assert_eq!(rebuilt.status, JobStatus::Success);
}

#[tokio::test]
async fn sweep_spares_everything_alive() {
    let h = Harness::new();
    h.project("ws", "web", Some("sleep 1"), None);

    let job = h.engine.builds.run_build("ws", "web").await.unwrap();
    assert!(h.engine.recovery.sweep().is_clean());
    assert_eq!(h.engine.jobs.get(&job.id).unwrap().status, JobStatus::Running);

    let done = wait_for(10_000, || {
        h.engine.jobs.get(&job.id).is_some_and(|j| j.is_terminal())
    })
    .await;
    assert!(done);
}

#[tokio::test]
async fn young_pending_job_survives_the_sweep() {
    let h = Harness::new();
    // Pending, no pid yet: the spawner may still be between create
    // and spawn. Only age past the staleness window condemns it.
    h.engine.jobs.create("ws", "web", JobKind::Build).unwrap();
    assert!(h.engine.recovery.sweep().is_clean());
}
