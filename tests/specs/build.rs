// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Build execution specs: one project, real shell children, the full
//! create → spawn → stream → settle → release cycle.

use crate::prelude::*;

#[tokio::test]
async fn successful_build_captures_child_output_verbatim() {
    let h = Harness::new();
    h.project("ws", "web", Some("printf 'compiling\\n'; printf 'done in 42ms\\n'"), None);

    let job = h.engine.builds.run_build_blocking("ws", "web").await.unwrap();
    assert_eq!(job.status, JobStatus::Success);
    assert_eq!(job.exit_code, Some(0));

    let log = std::fs::read_to_string(&job.log_path).unwrap();
    assert!(log.contains("compiling\ndone in 42ms\n"), "verbatim output, got: {log}");
    assert!(log.contains(&format!("build_start workspaceId=ws projectId=web jobId={}", job.id)));
    assert!(log.contains("build_end"));

    // Job record and log agree through a fresh engine over the same
    // state dir, as a restarted host would see it.
    let reread = h.engine.jobs.get(&job.id).unwrap();
    assert_eq!(reread.status, JobStatus::Success);
}

#[tokio::test]
async fn failed_build_reports_exit_code_and_stderr() {
    let h = Harness::new();
    h.project("ws", "web", Some("echo 'error: missing module' >&2; exit 2"), None);

    let job = h.engine.builds.run_build_blocking("ws", "web").await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.exit_code, Some(2));
    assert_eq!(job.error.as_deref(), Some("exit-2"));

    let log = std::fs::read_to_string(&job.log_path).unwrap();
    assert!(log.contains("error: missing module"));
}

#[tokio::test]
async fn run_build_returns_while_the_child_is_still_running() {
    let h = Harness::new();
    h.project("ws", "web", Some("sleep 1; echo late"), None);

    let job = h.engine.builds.run_build("ws", "web").await.unwrap();
    assert_eq!(job.status, JobStatus::Running);
    assert!(pid_alive(job.pid.unwrap()));

    // Progress is observable through the store while it runs.
    let state = h.engine.project_state("ws", "web");
    assert!(state.building);
    assert!(!state.can_build);

    let settled = wait_for(10_000, || {
        h.engine.jobs.get(&job.id).is_some_and(|j| j.is_terminal())
    })
    .await;
    assert!(settled, "build should settle on its own");
    assert_eq!(h.engine.jobs.get(&job.id).unwrap().status, JobStatus::Success);
}

#[tokio::test]
async fn each_build_gets_its_own_log_file() {
    let h = Harness::new();
    h.project("ws", "web", Some("echo run-output"), None);

    let first = h.engine.builds.run_build_blocking("ws", "web").await.unwrap();
    let second = h.engine.builds.run_build_blocking("ws", "web").await.unwrap();
    assert_ne!(first.id, second.id);
    assert_ne!(first.log_path, second.log_path);

    assert_eq!(
        h.engine.latest_log_tail("ws", "web", 50).len(),
        std::fs::read_to_string(&second.log_path).unwrap().lines().count()
    );
}

#[tokio::test]
async fn build_env_marks_the_child() {
    let h = Harness::new();
    h.project("ws", "web", Some("printf 'flag=%s\\n' \"$KILN_BUILD\""), None);

    let job = h.engine.builds.run_build_blocking("ws", "web").await.unwrap();
    let log = std::fs::read_to_string(&job.log_path).unwrap();
    assert!(log.contains("flag=1"));
}
