// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Preview supervision specs: spawn, idempotent start, stop, port
//! allocation and self-healing.

use crate::prelude::*;

#[tokio::test]
async fn preview_lifecycle_start_then_stop() {
    let h = Harness::new();
    h.project("ws", "web", None, Some("sleep 30"));

    let record = h.engine.preview.start("ws", "web").await.unwrap();
    assert_eq!(record.status, PreviewStatus::Running);
    let pid = record.pid.unwrap();
    let port = record.port.unwrap();
    assert!(pid_alive(pid));
    assert!((4100..=5000).contains(&port));
    assert_eq!(record.url.as_deref(), Some(format!("http://localhost:{port}").as_str()));

    let stopped = h.engine.preview.stop("ws", "web").await.unwrap();
    assert_eq!(stopped.status, PreviewStatus::Stopped);
    assert!(!pid_alive(pid));
}

#[tokio::test]
async fn second_start_reuses_the_live_preview() {
    let h = Harness::new();
    h.project("ws", "web", None, Some("sleep 30"));

    let first = h.engine.preview.start("ws", "web").await.unwrap();
    let second = h.engine.preview.start("ws", "web").await.unwrap();
    assert_eq!(first.pid, second.pid);
    assert_eq!(first.port, second.port);

    h.engine.preview.stop("ws", "web").await.unwrap();
}

#[tokio::test]
async fn two_projects_get_distinct_ports() {
    let h = Harness::new();
    h.project("ws", "web", None, Some("sleep 30"));
    h.project("ws", "api", None, Some("sleep 30"));

    let web = h.engine.preview.start("ws", "web").await.unwrap();
    let api = h.engine.preview.start("ws", "api").await.unwrap();
    assert_ne!(web.port, api.port);

    h.engine.preview.stop("ws", "web").await.unwrap();
    h.engine.preview.stop("ws", "api").await.unwrap();
}

#[tokio::test]
async fn exhausted_port_range_rejects_without_a_record() {
    // Hold the only candidate port.
    let held = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let port = held.local_addr().unwrap().port();

    let h = Harness::with_config(|c| c.port_range = PortRange::new(port, port));
    h.project("ws", "web", None, Some("sleep 30"));

    let err = h.engine.preview.start("ws", "web").await.unwrap_err();
    assert!(matches!(err, PreviewError::Port(_)));
    assert!(h.engine.previews.get("ws", "web").is_none());
}

#[tokio::test]
async fn crashed_preview_is_healed_by_the_health_tick() {
    let h = Harness::new();
    h.project("ws", "web", None, Some("sleep 30"));

    let record = h.engine.preview.start("ws", "web").await.unwrap();
    let old_pid = record.pid.unwrap();

    nix::sys::signal::killpg(
        nix::unistd::Pid::from_raw(old_pid as i32),
        nix::sys::signal::Signal::SIGKILL,
    )
    .unwrap();

    // Ticks run until the record shows a fresh live pid.
    let mut healed = false;
    for _ in 0..200 {
        h.engine.preview.health_tick().await;
        let record = h.engine.previews.get("ws", "web");
        if record.is_some_and(|r| r.is_running() && r.pid != Some(old_pid)) {
            healed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(healed, "health tick should respawn the dead preview");

    let fresh = h.engine.previews.get("ws", "web").unwrap();
    assert!(pid_alive(fresh.pid.unwrap()));
    h.engine.preview.stop("ws", "web").await.unwrap();
}

#[tokio::test]
async fn stopping_an_unknown_preview_is_an_error() {
    let h = Harness::new();
    assert!(matches!(
        h.engine.preview.stop("ws", "web").await,
        Err(PreviewError::NotFound { .. })
    ));
}
