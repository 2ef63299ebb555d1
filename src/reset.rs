//! Removal of the local data root.

use std::fs;

use anyhow::{Context, Result};

use crate::credentials::Prompt;
use crate::paths::Paths;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOutcome {
    NothingToRemove,
    Cancelled,
    Removed,
}

impl ResetOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            Self::NothingToRemove => "Nothing to remove",
            Self::Cancelled => "Reset cancelled",
            Self::Removed => "Local data removed",
        }
    }
}

/// Delete all persisted service state for the project.
///
/// Asks for confirmation unless `force` is set. A missing data root is not an
/// error.
pub fn reset(paths: &Paths, force: bool, prompt: &mut dyn Prompt) -> Result<ResetOutcome> {
    let root = paths.data_root();
    if !root.exists() {
        return Ok(ResetOutcome::NothingToRemove);
    }

    if !force {
        let question = format!("Remove all local data in {}?", root.display());
        if !prompt.confirm(&question)? {
            return Ok(ResetOutcome::Cancelled);
        }
    }

    fs::remove_dir_all(&root).with_context(|| format!("Failed to remove {}", root.display()))?;
    tracing::info!("Removed {}", root.display());
    Ok(ResetOutcome::Removed)
}
