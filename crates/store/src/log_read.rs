// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incremental log reads for streaming consumers.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Read everything appended past `offset` and return it with the new
/// offset to resume from.
///
/// A missing file is simply "nothing yet" (the writer creates it on
/// first append). A file shorter than `offset` means it was replaced;
/// the read restarts from the beginning so no content is skipped.
/// Bytes are decoded lossily, so a child emitting non-UTF-8 output
/// cannot break the stream.
pub fn read_from(path: &Path, offset: u64) -> std::io::Result<(String, u64)> {
    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok((String::new(), offset));
        }
        Err(e) => return Err(e),
    };

    let len = file.metadata()?.len();
    let start = if len < offset { 0 } else { offset };
    if len == start {
        return Ok((String::new(), start));
    }

    file.seek(SeekFrom::Start(start))?;
    let mut buf = Vec::with_capacity((len - start) as usize);
    file.read_to_end(&mut buf)?;
    let read = buf.len() as u64;
    Ok((String::from_utf8_lossy(&buf).into_owned(), start + read))
}

/// Last `max` lines of the file. Missing file yields no lines.
pub fn tail_lines(path: &Path, max: usize) -> Vec<String> {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let lines: Vec<&str> = raw.lines().collect();
    let skip = lines.len().saturating_sub(max);
    lines[skip..].iter().map(|l| l.to_string()).collect()
}

#[cfg(test)]
#[path = "log_read_tests.rs"]
mod tests;
