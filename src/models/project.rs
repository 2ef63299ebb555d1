use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PluginRegistry;

/// The per-directory record of what to run and how.
///
/// There is exactly one descriptor per project directory. It is loaded once per
/// invocation and only changed through the edit methods below, each of which is
/// expected to be followed by [`ProjectDescriptor::save`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectDescriptor {
    #[serde(default)]
    pub network: Network,
    #[serde(default = "default_run")]
    pub run: BTreeSet<RunTarget>,
    #[serde(default)]
    pub features: Features,
    /// Advanced engine parameters, passed through to the server verbatim.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub engine: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contracts: Option<ContractsConfig>,
    #[serde(default)]
    pub plugins: PluginRegistry,
    /// Backend source tree, relative to the project directory.
    #[serde(default = "default_backend_dir")]
    pub backend_dir: String,
    #[serde(default)]
    pub frontend: FrontendConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_run() -> BTreeSet<RunTarget> {
    [RunTarget::Backend, RunTarget::Frontend].into_iter().collect()
}

fn default_backend_dir() -> String {
    "backend".to_string()
}

impl Default for ProjectDescriptor {
    fn default() -> Self {
        Self {
            network: Network::default(),
            run: default_run(),
            features: Features::default(),
            engine: BTreeMap::new(),
            contracts: None,
            plugins: PluginRegistry::default(),
            backend_dir: default_backend_dir(),
            frontend: FrontendConfig::default(),
            updated_at: None,
        }
    }
}

impl ProjectDescriptor {
    /// Load the descriptor at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Load the descriptor, writing a default one first if none exists.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        tracing::info!("No descriptor at {}, creating default", path.display());
        let mut descriptor = Self::default();
        descriptor.save(path)?;
        Ok(descriptor)
    }

    /// Load the descriptor if there is one, defaults otherwise. Never writes.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Rewrite the descriptor to disk.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.updated_at = Some(Utc::now());
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize project descriptor")?;
        fs::write(path, content + "\n")
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn runs(&self, target: RunTarget) -> bool {
        self.run.contains(&target)
    }

    pub fn runs_backend(&self) -> bool {
        self.runs(RunTarget::Backend)
    }

    pub fn runs_frontend(&self) -> bool {
        self.runs(RunTarget::Frontend)
    }

    // ============================================================
    // Edit operations
    // ============================================================

    /// Flip whether `target` is part of the run set. Returns the new state.
    pub fn toggle_run(&mut self, target: RunTarget) -> bool {
        if !self.run.remove(&target) {
            self.run.insert(target);
            true
        } else {
            false
        }
    }

    pub fn set_network(&mut self, network: Network) {
        self.network = network;
    }

    pub fn set_sync_protocol(&mut self, enabled: bool) {
        self.features.sync_protocol = enabled;
    }

    pub fn set_verbose_logging(&mut self, enabled: bool) {
        self.features.verbose_logging = enabled;
    }

    pub fn set_advanced_engine(&mut self, enabled: bool) {
        self.features.advanced_engine = enabled;
    }

    /// Set or clear (`None`) one advanced engine parameter.
    pub fn set_engine_param(&mut self, key: &str, value: Option<serde_json::Value>) {
        match value {
            Some(value) => {
                self.engine.insert(key.to_string(), value);
            }
            None => {
                self.engine.remove(key);
            }
        }
    }

    /// Resolve the contracts section against the project layout.
    ///
    /// Returns `Ok(None)` when contracts are not configured and
    /// `Err(language)` when the configured language is not supported.
    pub fn resolve_contracts(&self, project_dir: &Path) -> Result<Option<Contracts>, String> {
        let Some(config) = &self.contracts else {
            return Ok(None);
        };
        let language = config
            .language
            .parse::<ContractsLanguage>()
            .map_err(|_| config.language.clone())?;
        let backend_dir = project_dir.join(&self.backend_dir);
        Ok(Some(Contracts {
            language,
            dir: backend_dir.join(&config.dir),
            backend_dir,
        }))
    }
}

/// Target chain network the server talks to.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    #[default]
    Local,
    Testnet,
    Mainnet,
}

impl Network {
    pub const ALL: [Network; 3] = [Network::Local, Network::Testnet, Network::Mainnet];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Testnet => "testnet",
            Self::Mainnet => "mainnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "testnet" => Ok(Self::Testnet),
            "mainnet" => Ok(Self::Mainnet),
            _ => Err(format!("Unknown network: {}", s)),
        }
    }
}

/// Service categories a project can run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunTarget {
    Backend,
    Frontend,
}

impl RunTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backend => "backend",
            Self::Frontend => "frontend",
        }
    }
}

impl FromStr for RunTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backend" => Ok(Self::Backend),
            "frontend" => Ok(Self::Frontend),
            _ => Err(format!("Unknown run target: {}", s)),
        }
    }
}

/// Feature toggles baked into the server environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Features {
    /// Peer discovery and state synchronization in the generated server.
    #[serde(default)]
    pub sync_protocol: bool,
    #[serde(default)]
    pub verbose_logging: bool,
    /// Whether `engine` parameters are passed to the server at all.
    #[serde(default)]
    pub advanced_engine: bool,
}

/// Contracts subsystem as written in the descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContractsConfig {
    pub language: String,
    /// Contracts sources, relative to the backend directory.
    #[serde(default = "default_contracts_dir")]
    pub dir: String,
}

fn default_contracts_dir() -> String {
    "contracts".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractsLanguage {
    Solidity,
    Rust,
}

impl ContractsLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Solidity => "solidity",
            Self::Rust => "rust",
        }
    }
}

impl FromStr for ContractsLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "solidity" => Ok(Self::Solidity),
            "rust" => Ok(Self::Rust),
            _ => Err(format!("Unsupported contracts language: {}", s)),
        }
    }
}

/// Contracts subsystem resolved against the project layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contracts {
    pub language: ContractsLanguage,
    /// Absolute contracts source directory.
    pub dir: PathBuf,
    /// Absolute backend directory; rebuilds run here.
    pub backend_dir: PathBuf,
}

impl Contracts {
    /// Where the toolchain leaves compiled artifacts.
    pub fn artifacts_dir(&self) -> PathBuf {
        match self.language {
            ContractsLanguage::Solidity => self.backend_dir.join("artifacts"),
            ContractsLanguage::Rust => self.dir.join("target/wasm32-unknown-unknown/release"),
        }
    }

    /// Toolchain output that must not trigger another rebuild.
    pub fn build_output_dirs(&self) -> Vec<PathBuf> {
        match self.language {
            ContractsLanguage::Solidity => vec![self.artifacts_dir(), self.backend_dir.join("cache")],
            ContractsLanguage::Rust => vec![self.dir.join("target")],
        }
    }
}

/// How the frontend dev server is started.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrontendConfig {
    /// Frontend source tree, relative to the project directory.
    pub dir: String,
    pub command: Vec<String>,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            dir: "frontend".to_string(),
            command: vec!["npm".to_string(), "run".to_string(), "dev".to_string()],
        }
    }
}
