// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Preview port allocation by bind probing.

use kiln_core::{PreviewRecord, PreviewStatus};
use std::net::TcpListener;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortError {
    #[error("no free port in {0}")]
    Exhausted(PortRange),

    #[error("invalid port range {0:?}, expected <start>-<end>")]
    InvalidRange(String),
}

/// Inclusive candidate port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self::new(4100, 5000)
    }
}

impl std::fmt::Display for PortRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for PortRange {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = || {
            let (start, end) = s.split_once('-')?;
            let start: u16 = start.trim().parse().ok()?;
            let end: u16 = end.trim().parse().ok()?;
            (start <= end).then_some(PortRange::new(start, end))
        };
        parse().ok_or_else(|| PortError::InvalidRange(s.to_string()))
    }
}

/// First port in the range that is both unreserved and bindable.
///
/// A successful bind is immediately dropped; the winner is handed to
/// the preview child, which re-binds it. The window between probe and
/// child bind is accepted, the reservation list is what prevents two
/// previews racing onto the same port.
pub fn allocate(range: PortRange, reserved: &[u16]) -> Result<u16, PortError> {
    for port in range.iter() {
        if reserved.contains(&port) {
            continue;
        }
        if TcpListener::bind(("127.0.0.1", port)).is_ok() {
            return Ok(port);
        }
    }
    Err(PortError::Exhausted(range))
}

/// Ports already claimed by preview records.
///
/// Failed records keep their port claimed too: a reachability-timeout
/// failure leaves the child running and possibly bound.
pub fn reserved_ports(previews: &[PreviewRecord]) -> Vec<u16> {
    previews
        .iter()
        .filter(|r| r.status != PreviewStatus::Stopped)
        .filter_map(|r| r.port)
        .collect()
}

#[cfg(test)]
#[path = "ports_tests.rs"]
mod tests;
