//! Filesystem locations for one invocation.
//!
//! [`Paths`] is built once from the project directory and handed by reference
//! to every component that touches the disk.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

pub const DESCRIPTOR_FILE: &str = "devstack.json";
pub const SECRETS_FILE: &str = "devstack.secrets.json";
pub const DATA_ROOT: &str = ".devstack";
pub const GENERATED_DIR: &str = ".generated";
const COMPOSE_FILE: &str = "compose.json";
const APP_NAME: &str = "devstack";
const GLOBAL_CREDENTIALS_FILE: &str = "credentials.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    project_dir: PathBuf,
    namespace: String,
}

impl Paths {
    /// Build paths for an existing project directory.
    pub fn new(project_dir: impl AsRef<Path>) -> Result<Self> {
        let project_dir = project_dir.as_ref();
        let project_dir = project_dir
            .canonicalize()
            .with_context(|| format!("Project directory {} not found", project_dir.display()))?;
        let namespace = namespace_slug(&project_dir);
        Ok(Self {
            project_dir,
            namespace,
        })
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Compose project name scoping every container runtime call.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn descriptor_file(&self) -> PathBuf {
        self.project_dir.join(DESCRIPTOR_FILE)
    }

    pub fn secrets_file(&self) -> PathBuf {
        self.project_dir.join(SECRETS_FILE)
    }

    /// Root of all persistent local state. Removed only by reset.
    pub fn data_root(&self) -> PathBuf {
        self.project_dir.join(DATA_ROOT)
    }

    pub fn volumes_dir(&self) -> PathBuf {
        self.data_root().join("volumes")
    }

    pub fn compose_file(&self) -> PathBuf {
        self.data_root().join(COMPOSE_FILE)
    }

    pub fn backend_dir(&self, relative: &str) -> PathBuf {
        self.project_dir.join(relative)
    }

    pub fn frontend_dir(&self, relative: &str) -> PathBuf {
        self.project_dir.join(relative)
    }

    /// Directory holding the generated server bootstrap inside the backend tree.
    pub fn generated_dir(&self, backend_relative: &str) -> PathBuf {
        self.backend_dir(backend_relative).join(GENERATED_DIR)
    }
}

/// Location of the global (user-level) credentials file.
pub fn global_credentials_file() -> Result<PathBuf> {
    let mut path =
        dirs::config_dir().ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
    path.push(APP_NAME);
    path.push(GLOBAL_CREDENTIALS_FILE);
    Ok(path)
}

/// Derive the namespace slug for a project directory.
///
/// The directory name is lowercased and reduced to `[a-z0-9-]`, then suffixed
/// with a hash of the full path so that equally named directories elsewhere on
/// disk get distinct namespaces.
pub fn namespace_slug(project_dir: &Path) -> String {
    let name = project_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { APP_NAME } else { slug };

    let hash = hex::encode(Sha256::digest(project_dir.to_string_lossy().as_bytes()));
    format!("{}-{}", slug, &hash[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_is_lowercase_and_dashed() {
        let slug = namespace_slug(Path::new("/home/dev/My Cool_App"));
        assert!(slug.starts_with("my-cool-app-"), "{slug}");
        assert_eq!(slug.len(), "my-cool-app-".len() + 8);
    }

    #[test]
    fn slug_is_stable_for_the_same_directory() {
        let a = namespace_slug(Path::new("/work/app"));
        let b = namespace_slug(Path::new("/work/app"));
        assert_eq!(a, b);
    }

    #[test]
    fn same_name_in_different_parents_does_not_collide() {
        let a = namespace_slug(Path::new("/work/a/app"));
        let b = namespace_slug(Path::new("/work/b/app"));
        assert_ne!(a, b);
        assert!(a.starts_with("app-") && b.starts_with("app-"));
    }

    #[test]
    fn suffix_is_the_path_digest_prefix() {
        assert_eq!(namespace_slug(Path::new("/work/app")), "app-70467eff");
    }

    #[test]
    fn unusable_names_fall_back() {
        let slug = namespace_slug(Path::new("/"));
        assert!(slug.starts_with("devstack-"));
    }
}
