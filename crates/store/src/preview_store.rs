// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable registry of preview records, keyed by (workspace, project).

use crate::fsutil::{read_json_opt, write_json_atomic};
use crate::job_store::StoreError;
use crate::paths;
use kiln_core::{Clock, PreviewRecord};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

/// File-backed preview collection. Same serialization discipline as
/// [`crate::JobStore`]: every mutation holds the store mutex across
/// read-all → mutate → write-all, and the write publishes atomically.
#[derive(Clone)]
pub struct PreviewStore<C: Clock> {
    state_dir: PathBuf,
    clock: C,
    guard: Arc<Mutex<()>>,
}

impl<C: Clock> PreviewStore<C> {
    pub fn new(state_dir: PathBuf, clock: C) -> Self {
        Self { state_dir, clock, guard: Arc::new(Mutex::new(())) }
    }

    /// Insert or replace the record for the record's project key.
    pub fn upsert(&self, record: PreviewRecord) -> Result<(), StoreError> {
        let _held = self.guard.lock();
        let mut records = self.read_all();
        records.retain(|r| {
            !(r.workspace_id == record.workspace_id && r.project_id == record.project_id)
        });
        records.push(record);
        self.write_all(&records)
    }

    pub fn get(&self, workspace_id: &str, project_id: &str) -> Option<PreviewRecord> {
        self.read_all()
            .into_iter()
            .find(|r| r.workspace_id == workspace_id && r.project_id == project_id)
    }

    /// Snapshot of every record.
    pub fn all(&self) -> Vec<PreviewRecord> {
        self.read_all()
    }

    pub fn mark_stopped(
        &self,
        workspace_id: &str,
        project_id: &str,
        reason: &str,
    ) -> Result<Option<PreviewRecord>, StoreError> {
        let now = self.clock.epoch_ms();
        self.update(workspace_id, project_id, |r| r.mark_stopped(reason, now))
    }

    pub fn mark_failed(
        &self,
        workspace_id: &str,
        project_id: &str,
        reason: &str,
    ) -> Result<Option<PreviewRecord>, StoreError> {
        let now = self.clock.epoch_ms();
        self.update(workspace_id, project_id, |r| r.mark_failed(reason, now))
    }

    /// Apply `f` to the project's record if one exists. Returns the
    /// updated record, or `None` when the project has no record (a
    /// stop for a never-started preview is not an error).
    fn update(
        &self,
        workspace_id: &str,
        project_id: &str,
        f: impl FnOnce(&mut PreviewRecord),
    ) -> Result<Option<PreviewRecord>, StoreError> {
        let _held = self.guard.lock();
        let mut records = self.read_all();
        let Some(record) = records
            .iter_mut()
            .find(|r| r.workspace_id == workspace_id && r.project_id == project_id)
        else {
            return Ok(None);
        };
        f(record);
        let updated = record.clone();
        self.write_all(&records)?;
        Ok(Some(updated))
    }

    fn read_all(&self) -> Vec<PreviewRecord> {
        read_json_opt(&paths::previews_file(&self.state_dir)).unwrap_or_default()
    }

    fn write_all(&self, records: &[PreviewRecord]) -> Result<(), StoreError> {
        write_json_atomic(&paths::previews_file(&self.state_dir), &records)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "preview_store_tests.rs"]
mod tests;
