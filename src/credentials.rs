//! Scoped credentials and their resolution.
//!
//! Credentials live in two scopes: the project (`devstack.secrets.json` next to
//! the descriptor) and the user's global config directory. Project values win.
//! Empty strings count as absent so they never reach the service environment.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dialoguer::{Confirm, Password};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Network;

/// Credentials stored in one scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialSet {
    /// Server signing key per network.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub server_keys: BTreeMap<Network, String>,
    /// Key for the external data API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Bearer token guarding the server's admin endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_token: Option<String>,
}

/// Credentials after merging project and global scope for one network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedCredentials {
    pub server_key: Option<String>,
    pub api_key: Option<String>,
    pub admin_token: Option<String>,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

fn pick(project: Option<&String>, global: Option<&String>) -> Option<String> {
    non_empty(project).or_else(|| non_empty(global))
}

/// Merge both scopes; project-level values take precedence.
pub fn resolve(project: &CredentialSet, global: &CredentialSet, network: Network) -> ResolvedCredentials {
    ResolvedCredentials {
        server_key: pick(
            project.server_keys.get(&network),
            global.server_keys.get(&network),
        ),
        api_key: pick(project.api_key.as_ref(), global.api_key.as_ref()),
        admin_token: pick(project.admin_token.as_ref(), global.admin_token.as_ref()),
    }
}

/// Fresh random secret used when the operator declines to enter one.
pub fn generate_secret() -> String {
    Uuid::new_v4().simple().to_string()
}

// ============================================================
// Storage
// ============================================================

/// Persistent storage for one credential scope.
pub trait CredentialStore {
    fn load(&self) -> Result<CredentialSet>;
    fn save(&self, credentials: &CredentialSet) -> Result<()>;
}

/// JSON file store. A missing file loads as an empty set.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<CredentialSet> {
        if !self.path.exists() {
            return Ok(CredentialSet::default());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    fn save(&self, credentials: &CredentialSet) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create credentials directory")?;
        }
        let content =
            serde_json::to_string_pretty(credentials).context("Failed to serialize credentials")?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

// ============================================================
// Prompting
// ============================================================

/// Operator interaction used when something has to be asked.
pub trait Prompt {
    /// Ask for a secret value. `None` means the operator skipped it.
    fn secret(&mut self, label: &str) -> Result<Option<String>>;
    /// Ask a yes/no question.
    fn confirm(&mut self, question: &str) -> Result<bool>;
}

/// [`Prompt`] on the controlling terminal. Secrets are read without echo.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn secret(&mut self, label: &str) -> Result<Option<String>> {
        let value = Password::new()
            .with_prompt(label)
            .allow_empty_password(true)
            .interact()?;
        let value = value.trim();
        Ok(if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        })
    }

    fn confirm(&mut self, question: &str) -> Result<bool> {
        Ok(Confirm::new()
            .with_prompt(question)
            .default(false)
            .interact()?)
    }
}

/// Resolve credentials for a start, filling gaps in the project scope.
///
/// A missing server key is asked for once and generated if the operator skips
/// the prompt. A missing admin token is always generated. Anything filled in is
/// persisted to the project store.
pub fn prepare_for_start(
    project_store: &dyn CredentialStore,
    global_store: &dyn CredentialStore,
    network: Network,
    prompt: &mut dyn Prompt,
) -> Result<ResolvedCredentials> {
    let mut project = project_store.load()?;
    let global = global_store.load()?;
    let mut resolved = resolve(&project, &global, network);
    let mut changed = false;

    if resolved.server_key.is_none() {
        tracing::warn!("No server key configured for {}", network);
        let key = match prompt.secret(&format!("Server key for {} (leave empty to generate)", network))? {
            Some(key) => key,
            None => {
                tracing::info!("Generating a server key for {}", network);
                generate_secret()
            }
        };
        project.server_keys.insert(network, key.clone());
        resolved.server_key = Some(key);
        changed = true;
    }

    if resolved.admin_token.is_none() {
        let token = generate_secret();
        project.admin_token = Some(token.clone());
        resolved.admin_token = Some(token);
        changed = true;
    }

    if changed {
        project_store.save(&project)?;
    }
    Ok(resolved)
}
