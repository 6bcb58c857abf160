// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event stream specs: following a real build from subscription to
//! terminal state.

use crate::prelude::*;
use tokio::sync::mpsc;

async fn next_event(rx: &mut mpsc::Receiver<StreamEvent>) -> StreamEvent {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("stream stalled")
        .expect("stream closed")
}

#[tokio::test]
async fn a_full_build_is_observable_end_to_end() {
    let h = Harness::new();
    h.project("ws", "web", Some("echo streamed-line; sleep 0.2; echo second-line"), None);

    let cancel = CancellationToken::new();
    let mut rx = h.engine.events.subscribe("ws", "web", cancel.clone());

    assert!(matches!(next_event(&mut rx).await, StreamEvent::Hello { .. }));

    h.engine.builds.run_build("ws", "web").await.unwrap();

    let mut saw_running = false;
    let mut log_text = String::new();
    loop {
        match next_event(&mut rx).await {
            StreamEvent::State { job: Some(job), .. } => {
                if job.status == JobStatus::Running {
                    saw_running = true;
                }
                if job.is_terminal() {
                    assert_eq!(job.status, JobStatus::Success);
                    break;
                }
            }
            StreamEvent::Log { source: LogSource::Build, text } => log_text.push_str(&text),
            _ => {}
        }
    }
    // Drain a few more ticks for log chunks that trail the state flip.
    for _ in 0..10 {
        if let StreamEvent::Log { source: LogSource::Build, text } = next_event(&mut rx).await {
            log_text.push_str(&text);
        }
    }

    assert!(saw_running, "stream should show the running phase");
    assert!(log_text.contains("streamed-line"));
    assert!(log_text.contains("second-line"));
    cancel.cancel();
}

#[tokio::test]
async fn two_subscribers_see_the_same_build_independently() {
    let h = Harness::new();
    h.project("ws", "web", Some("echo shared-output"), None);

    let cancel = CancellationToken::new();
    let mut a = h.engine.events.subscribe("ws", "web", cancel.clone());
    let mut b = h.engine.events.subscribe("ws", "web", cancel.clone());

    h.engine.builds.run_build_blocking("ws", "web").await.unwrap();

    for rx in [&mut a, &mut b] {
        let mut seen = String::new();
        while !seen.contains("shared-output") {
            if let StreamEvent::Log { source: LogSource::Build, text } = next_event(rx).await {
                seen.push_str(&text);
            }
        }
    }
    cancel.cancel();
}

#[tokio::test]
async fn pings_keep_a_quiet_stream_alive() {
    let h = Harness::new();
    let cancel = CancellationToken::new();
    let mut rx = h.engine.events.subscribe("ws", "web", cancel.clone());

    loop {
        if matches!(next_event(&mut rx).await, StreamEvent::Ping) {
            break;
        }
    }
    cancel.cancel();
}

#[tokio::test]
async fn cancelling_the_token_ends_the_subscription() {
    let h = Harness::new();
    let cancel = CancellationToken::new();
    let mut rx = h.engine.events.subscribe("ws", "web", cancel.clone());
    next_event(&mut rx).await;

    cancel.cancel();
    let closed = tokio::time::timeout(Duration::from_secs(10), async {
        while rx.recv().await.is_some() {}
    })
    .await;
    assert!(closed.is_ok(), "stream should close after cancellation");
}
