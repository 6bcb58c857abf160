// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-project build/preview manifest.
//!
//! The manifest is owned by an external collaborator; the core only
//! loads it and resolves concrete commands from it.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// File name of the manifest inside a project root.
pub const MANIFEST_FILE: &str = "kiln.manifest.json";

/// Placeholder in preview args replaced with the allocated port.
pub const PORT_PLACEHOLDER: &str = "$PORT";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest not readable at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("manifest at {path} is not valid JSON: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("command '{0}' not defined in manifest")]
    MissingCommand(CommandKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Build,
    Preview,
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandKind::Build => write!(f, "build"),
            CommandKind::Preview => write!(f, "preview"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestCommand {
    pub cmd: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestCommands {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<ManifestCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<ManifestCommand>,
}

/// Per-project description of how to build and preview it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub framework: String,
    pub commands: ManifestCommands,
}

impl Manifest {
    /// Default manifest for projects without one: npm build, npm dev
    /// server bound to the substituted port.
    pub fn default_for(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            framework: "vite".to_string(),
            commands: ManifestCommands {
                build: Some(ManifestCommand {
                    cmd: "npm".to_string(),
                    args: vec!["run".into(), "build".into()],
                }),
                preview: Some(ManifestCommand {
                    cmd: "npm".to_string(),
                    args: vec![
                        "run".into(),
                        "dev".into(),
                        "--".into(),
                        "--host".into(),
                        "0.0.0.0".into(),
                        "--port".into(),
                        PORT_PLACEHOLDER.into(),
                    ],
                }),
            },
        }
    }

    /// Load `kiln.manifest.json` from the project root, writing the
    /// default manifest there when none exists.
    pub fn load_or_default(project_root: &Path, name: &str) -> Result<Self, ManifestError> {
        let path = project_root.join(MANIFEST_FILE);
        if path.exists() {
            let raw = std::fs::read_to_string(&path).map_err(|source| ManifestError::Io {
                path: path.display().to_string(),
                source,
            })?;
            return serde_json::from_str(&raw).map_err(|source| ManifestError::Parse {
                path: path.display().to_string(),
                source,
            });
        }

        let manifest = Self::default_for(name);
        // Best-effort persist of the generated default; loading still
        // succeeds if the project dir is read-only.
        if let Ok(json) = serde_json::to_string_pretty(&manifest) {
            if let Err(e) = std::fs::write(&path, json) {
                tracing::warn!(path = %path.display(), error = %e, "failed to write default manifest");
            }
        }
        Ok(manifest)
    }

    /// Resolve the concrete command for `kind`, substituting the
    /// `$PORT` placeholder in preview args when a port is given.
    pub fn resolve_command(
        &self,
        kind: CommandKind,
        port: Option<u16>,
    ) -> Result<ManifestCommand, ManifestError> {
        let command = match kind {
            CommandKind::Build => self.commands.build.as_ref(),
            CommandKind::Preview => self.commands.preview.as_ref(),
        }
        .ok_or(ManifestError::MissingCommand(kind))?;

        if kind == CommandKind::Preview {
            if let Some(port) = port {
                return Ok(ManifestCommand {
                    cmd: command.cmd.clone(),
                    args: command
                        .args
                        .iter()
                        .map(|a| {
                            if a == PORT_PLACEHOLDER {
                                port.to_string()
                            } else {
                                a.clone()
                            }
                        })
                        .collect(),
                });
            }
        }

        Ok(command.clone())
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
