// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mutual exclusion specs: the project lock, the global build slot,
//! and stale-holder reclaim.

use crate::prelude::*;

#[tokio::test]
async fn concurrent_build_on_same_project_is_rejected() {
    let h = Harness::new();
    h.project("ws", "web", Some("sleep 2"), None);

    let first = h.engine.builds.run_build("ws", "web").await.unwrap();
    let err = h.engine.builds.run_build("ws", "web").await.unwrap_err();
    assert!(matches!(err, BuildError::AlreadyBuilding { .. }));

    // The loser left no job record behind.
    let jobs = h.engine.jobs.jobs_for("ws", "web");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, first.id);
}

#[tokio::test]
async fn global_slot_serializes_builds_across_projects() {
    let h = Harness::new();
    h.project("ws", "web", Some("sleep 2"), None);
    h.project("ws", "api", Some("true"), None);

    h.engine.builds.run_build("ws", "web").await.unwrap();
    let err = h.engine.builds.run_build("ws", "api").await.unwrap_err();
    assert!(matches!(err, BuildError::Locked { .. }));

    // The rejected build must not leak its project lock.
    assert!(h
        .engine
        .locks
        .inspect(&LockScope::project("ws", "api"))
        .is_none());
}

#[tokio::test]
async fn locks_are_released_when_the_build_settles() {
    let h = Harness::new();
    h.project("ws", "web", Some("true"), None);

    h.engine.builds.run_build_blocking("ws", "web").await.unwrap();
    assert!(h.engine.locks.inspect(&LockScope::Global).is_none());
    assert!(h
        .engine
        .locks
        .inspect(&LockScope::project("ws", "web"))
        .is_none());

    // And the slot is immediately usable again.
    h.engine.builds.run_build_blocking("ws", "web").await.unwrap();
}

#[tokio::test]
async fn dead_holder_locks_are_reclaimed_transparently() {
    let h = Harness::new();
    h.project("ws", "web", Some("echo reclaimed"), None);

    // Locks left behind by a crashed process.
    h.plant_lock(&LockScope::Global, dead_pid());
    h.plant_lock(&LockScope::project("ws", "web"), dead_pid());

    let job = h.engine.builds.run_build_blocking("ws", "web").await.unwrap();
    assert_eq!(job.status, JobStatus::Success);
}

#[tokio::test]
async fn live_foreign_holder_is_respected() {
    let h = Harness::new();
    h.project("ws", "web", Some("true"), None);

    // Pid 1 is always alive; its lease must hold.
    h.plant_lock(&LockScope::Global, 1);

    let err = h.engine.builds.run_build("ws", "web").await.unwrap_err();
    assert!(matches!(err, BuildError::Locked { pid: 1, .. }));
    assert!(h.engine.jobs.all().is_empty());
}
