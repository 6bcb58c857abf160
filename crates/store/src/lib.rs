// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! kiln-store: durable job/preview/lock collections and log files.
//!
//! All durable state lives under one state directory in three
//! collections (jobs, previews, one lock file per scope) plus
//! append-only log files named deterministically from workspace,
//! project and job ids. Every mutation goes through a store's
//! serialized read-all → mutate → write-all path; no component writes
//! these files directly.

mod fsutil;

pub mod job_store;
pub mod lock_manager;
pub mod log_read;
pub mod paths;
pub mod preview_store;

pub use job_store::{JobStore, StoreError};
pub use lock_manager::{LockError, LockManager};
pub use log_read::{read_from, tail_lines};
pub use preview_store::PreviewStore;
