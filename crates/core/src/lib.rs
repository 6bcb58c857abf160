// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! kiln-core: domain types for the kiln build/preview orchestration core.

pub mod clock;
pub mod id;
pub mod job;
pub mod lock;
pub mod manifest;
pub mod preview;
pub mod process;

pub use clock::{Clock, FakeClock, SystemClock};
pub use id::JobId;
pub use job::{Job, JobKind, JobStatus};
pub use lock::{LockRecord, LockScope};
pub use manifest::{CommandKind, Manifest, ManifestCommand, ManifestError, MANIFEST_FILE};
pub use preview::{PreviewRecord, PreviewStatus};
pub use process::pid_alive;
