// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace project path resolution.
//!
//! Workspace and project ids come in from external callers, so both
//! are validated against a strict charset before they touch a path.
//! Anything containing a separator or dot cannot escape the
//! workspaces root.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("invalid id {0:?}, expected [A-Za-z0-9_-]+")]
    InvalidId(String),

    #[error("project {workspace_id}/{project_id} does not exist")]
    ProjectNotFound { workspace_id: String, project_id: String },
}

/// Non-empty and limited to `[A-Za-z0-9_-]`.
pub fn valid_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn checked_id(id: &str) -> Result<&str, WorkspaceError> {
    if valid_id(id) {
        Ok(id)
    } else {
        Err(WorkspaceError::InvalidId(id.to_string()))
    }
}

/// Resolve `<state>/workspaces/<ws>/projects/<proj>`, requiring the
/// directory to exist.
pub fn project_root(
    state_dir: &Path,
    workspace_id: &str,
    project_id: &str,
) -> Result<PathBuf, WorkspaceError> {
    let root = kiln_store::paths::workspaces_dir(state_dir)
        .join(checked_id(workspace_id)?)
        .join("projects")
        .join(checked_id(project_id)?);

    if !root.is_dir() {
        return Err(WorkspaceError::ProjectNotFound {
            workspace_id: workspace_id.to_string(),
            project_id: project_id.to_string(),
        });
    }
    Ok(root)
}

#[cfg(test)]
#[path = "workspace_tests.rs"]
mod tests;
