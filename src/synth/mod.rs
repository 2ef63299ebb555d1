//! Generation of everything written before a start.
//!
//! Synthesis runs entirely in memory and only returns [`Artifacts`]; nothing is
//! written until every part has been produced, so a bad descriptor never leaves
//! a half-written environment behind.

pub mod compose;
pub mod entry;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use thiserror::Error;

use crate::credentials::ResolvedCredentials;
use crate::models::{EnvironmentDescriptor, ProjectDescriptor};
use crate::paths::Paths;

pub use compose::{synthesize_environment, EnvironmentInput};
pub use entry::{lower_registry, render_entry, Bootstrap};

#[derive(Debug, Error)]
pub enum SynthError {
    #[error("Unsupported contracts language: {0}")]
    UnsupportedContractsLanguage(String),

    #[error("Plugin '{name}' points outside the backend directory: {path}")]
    PluginOutsideBackend { name: String, path: String },

    #[error("Invalid backend manifest {path}: {message}")]
    BackendManifest { path: PathBuf, message: String },

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// All generated files for one start.
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub environment: EnvironmentDescriptor,
    /// `None` when backend is not requested.
    pub bootstrap: Option<Bootstrap>,
}

impl Artifacts {
    /// Synthesize the environment descriptor and the server bootstrap.
    pub fn synthesize(
        paths: &Paths,
        project: &ProjectDescriptor,
        credentials: &ResolvedCredentials,
    ) -> Result<Self, SynthError> {
        let contracts = project
            .resolve_contracts(paths.project_dir())
            .map_err(SynthError::UnsupportedContractsLanguage)?;

        let environment = synthesize_environment(&EnvironmentInput {
            paths,
            project,
            credentials,
            contracts: contracts.as_ref(),
        })?;

        let bootstrap = if project.runs_backend() {
            Some(Bootstrap::synthesize(paths, project)?)
        } else {
            None
        };

        Ok(Self {
            environment,
            bootstrap,
        })
    }

    /// Write the compose file and, if present, the bootstrap files.
    pub fn write(&self, paths: &Paths, project: &ProjectDescriptor) -> anyhow::Result<()> {
        write_file(
            &paths.compose_file(),
            &serde_json::to_string_pretty(&self.environment)?,
        )?;
        if let Some(bootstrap) = &self.bootstrap {
            bootstrap.write_to(&paths.generated_dir(&project.backend_dir))?;
        }
        Ok(())
    }
}

pub(crate) fn write_file(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
}
