use serde::{Deserialize, Serialize};

/// Ordered plugin registry of the application server.
///
/// Order is insertion order and is preserved all the way into the generated
/// bootstrap, so unchanged registries render to identical bytes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct PluginRegistry {
    entries: Vec<PluginEntry>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a plugin, or replace the one with the same name in place.
    pub fn insert(&mut self, entry: PluginEntry) {
        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<PluginEntry> {
        let index = self.entries.iter().position(|e| e.name == name)?;
        Some(self.entries.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A registered plugin as written in the project descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginEntry {
    pub name: String,
    /// Source file, relative to the project directory.
    pub path: String,
    #[serde(flatten)]
    pub kind: PluginKind,
}

impl PluginEntry {
    pub fn handler(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: PluginKind::Handler,
        }
    }

    pub fn provider(
        name: impl Into<String>,
        path: impl Into<String>,
        hydration: Option<HydrationBackend>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: PluginKind::Provider { hydration },
        }
    }
}

/// Plugin category.
///
/// - `Handler`: stateless request handler
/// - `Provider`: lookup provider, optionally hydrated from one of the data stores
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PluginKind {
    Handler,
    Provider {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hydration: Option<HydrationBackend>,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HydrationBackend {
    Postgres,
    Redis,
}

impl HydrationBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Redis => "redis",
        }
    }
}

/// A plugin lowered for rendering: container path plus category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginBinding {
    pub name: String,
    pub container_path: String,
    pub category: PluginKind,
}
