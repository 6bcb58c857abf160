// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic JSON file publication.

use serde::Serialize;
use std::path::Path;

/// Write a JSON value atomically: serialize to a sibling temp file,
/// then rename over the target. Readers never observe a partial
/// write, which is what makes lock acquisition and the collection
/// stores safe against a crash mid-write.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let tmp = path.with_extension(format!("tmp_{}", std::process::id()));
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)
}

/// Read a JSON value, treating a missing file as `None` and an
/// unreadable/corrupt file as `None` as well (fail-open on read; the
/// atomic write path keeps corruption out of the normal case).
pub(crate) fn read_json_opt<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}
