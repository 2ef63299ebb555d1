//! Server bootstrap synthesis.
//!
//! The plugin registry is lowered to a list of [`PluginBinding`]s (container
//! paths, category and hydration backend) which a single pass renders into the
//! entry source. Rendering walks the bindings in registry order and nothing
//! else feeds into the output, so unchanged registries produce identical bytes
//! and the image build cache stays warm.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::Result;

use crate::models::{PluginBinding, PluginKind, PluginRegistry, ProjectDescriptor};
use crate::paths::{Paths, GENERATED_DIR};

use super::compose::{POSTGRES, REDIS};
use super::{write_file, SynthError};

/// Where the backend tree is copied inside the server image.
pub const CONTAINER_BACKEND_DIR: &str = "/app/backend";

pub const ENTRY_FILE: &str = "index.js";
pub const MANIFEST_FILE: &str = "package.json";
pub const BUILD_FILE: &str = "Dockerfile";
pub const WAIT_SCRIPT_FILE: &str = "wait-for.sh";

/// Dependencies the generated entry needs regardless of the application.
const RUNTIME_DEPENDENCIES: [(&str, &str); 3] = [
    ("@devstack/runtime", "^1.0.0"),
    ("pg", "^8.11.0"),
    ("redis", "^4.6.0"),
];

/// Generated server bootstrap files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bootstrap {
    pub entry_source: String,
    pub manifest: String,
    pub build_file: String,
    pub wait_script: String,
}

impl Bootstrap {
    pub fn synthesize(paths: &Paths, project: &ProjectDescriptor) -> Result<Self, SynthError> {
        let backend_dir = paths.backend_dir(&project.backend_dir);
        let bindings = lower_registry(&project.plugins, paths.project_dir(), &backend_dir)?;
        let app_dependencies = read_app_dependencies(&backend_dir.join(MANIFEST_FILE))?;

        Ok(Self {
            entry_source: render_entry(&bindings),
            manifest: render_manifest(paths.namespace(), app_dependencies)?,
            build_file: render_build_file(),
            wait_script: WAIT_SCRIPT.to_string(),
        })
    }

    /// Replace the contents of `dir` with the generated files.
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        write_file(&dir.join(ENTRY_FILE), &self.entry_source)?;
        write_file(&dir.join(MANIFEST_FILE), &self.manifest)?;
        write_file(&dir.join(BUILD_FILE), &self.build_file)?;
        write_file(&dir.join(WAIT_SCRIPT_FILE), &self.wait_script)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dir.join(WAIT_SCRIPT_FILE), fs::Permissions::from_mode(0o755))?;
        }
        Ok(())
    }
}

/// Lower registry entries to container-side bindings, keeping their order.
///
/// Entry paths are relative to `project_dir` and must resolve inside
/// `backend_dir`, which is what the image copies to [`CONTAINER_BACKEND_DIR`].
pub fn lower_registry(
    registry: &PluginRegistry,
    project_dir: &Path,
    backend_dir: &Path,
) -> Result<Vec<PluginBinding>, SynthError> {
    let backend_dir = normalize(backend_dir);
    registry
        .iter()
        .map(|entry| {
            let host_path = normalize(&project_dir.join(&entry.path));
            let outside = || SynthError::PluginOutsideBackend {
                name: entry.name.clone(),
                path: entry.path.clone(),
            };
            let relative = host_path.strip_prefix(&backend_dir).map_err(|_| outside())?;
            if relative.as_os_str().is_empty() {
                return Err(outside());
            }

            let mut container_path = CONTAINER_BACKEND_DIR.to_string();
            for component in relative.components() {
                container_path.push('/');
                container_path.push_str(&component.as_os_str().to_string_lossy());
            }

            Ok(PluginBinding {
                name: entry.name.clone(),
                container_path,
                category: entry.kind,
            })
        })
        .collect()
}

/// Lexically resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn js_string(s: &str) -> String {
    // JSON string literals are valid JavaScript string literals.
    serde_json::Value::String(s.to_string()).to_string()
}

/// Render the entry source for a list of bindings.
pub fn render_entry(bindings: &[PluginBinding]) -> String {
    let mut out = String::new();
    out.push_str("// Generated by devstack. Regenerated on every start; do not edit.\n");
    out.push_str("\"use strict\";\n\n");
    out.push_str("const { Runtime } = require(\"@devstack/runtime\");\n\n");
    out.push_str("const runtime = new Runtime({\n");
    out.push_str("  databaseUrl: process.env.DATABASE_URL,\n");
    out.push_str("  redisUrl: process.env.REDIS_URL,\n");
    out.push_str("  port: Number(process.env.PORT || 8080),\n");
    out.push_str("});\n");

    if !bindings.is_empty() {
        out.push('\n');
    }
    for binding in bindings {
        let name = js_string(&binding.name);
        let module = format!("require({})", js_string(&binding.container_path));
        match binding.category {
            PluginKind::Handler => {
                out.push_str(&format!("runtime.registerHandler({}, {});\n", name, module));
            }
            PluginKind::Provider { hydration: None } => {
                out.push_str(&format!("runtime.registerProvider({}, {});\n", name, module));
            }
            PluginKind::Provider {
                hydration: Some(backend),
            } => {
                out.push_str(&format!(
                    "runtime.registerProvider({}, {}, {{ hydrate: {} }});\n",
                    name,
                    module,
                    js_string(backend.as_str())
                ));
            }
        }
    }

    out.push_str("\nruntime.start().catch((err) => {\n");
    out.push_str("  console.error(err);\n");
    out.push_str("  process.exit(1);\n");
    out.push_str("});\n");
    out
}

/// Read `dependencies` from the application's own manifest, if it has one.
fn read_app_dependencies(path: &Path) -> Result<BTreeMap<String, String>, SynthError> {
    let manifest_error = |message: String| SynthError::BackendManifest {
        path: path.to_path_buf(),
        message,
    };

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(manifest_error(e.to_string())),
    };
    let manifest: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| manifest_error(e.to_string()))?;

    let mut dependencies = BTreeMap::new();
    if let Some(declared) = manifest.get("dependencies").and_then(|d| d.as_object()) {
        for (name, version) in declared {
            let version = version
                .as_str()
                .ok_or_else(|| manifest_error(format!("version of '{}' is not a string", name)))?;
            dependencies.insert(name.clone(), version.to_string());
        }
    }
    Ok(dependencies)
}

/// Merge application dependencies with the runtime set; runtime versions win.
fn render_manifest(
    namespace: &str,
    mut dependencies: BTreeMap<String, String>,
) -> Result<String, SynthError> {
    for (name, version) in RUNTIME_DEPENDENCIES {
        dependencies.insert(name.to_string(), version.to_string());
    }
    let manifest = serde_json::json!({
        "name": format!("{}-server", namespace),
        "private": true,
        "main": ENTRY_FILE,
        "dependencies": dependencies,
    });
    Ok(serde_json::to_string_pretty(&manifest)? + "\n")
}

fn render_build_file() -> String {
    let generated = format!("{}/{}", CONTAINER_BACKEND_DIR, GENERATED_DIR);
    format!(
        r#"# Generated by devstack. Regenerated on every start; do not edit.
FROM node:20-alpine
WORKDIR {backend}
COPY . {backend}
WORKDIR {generated}
RUN npm install --omit=dev
ENV NODE_PATH={generated}/node_modules
CMD ["sh", "{generated}/{wait}", "{postgres}:5432", "{redis}:6379", "--", "node", "{generated}/{entry}"]
"#,
        backend = CONTAINER_BACKEND_DIR,
        generated = generated,
        wait = WAIT_SCRIPT_FILE,
        postgres = POSTGRES,
        redis = REDIS,
        entry = ENTRY_FILE,
    )
}

const WAIT_SCRIPT: &str = r#"#!/bin/sh
# Generated by devstack. Waits for every host:port argument to accept TCP
# connections, then runs the command after "--".
set -e

while [ "$#" -gt 0 ] && [ "$1" != "--" ]; do
  host="${1%:*}"
  port="${1##*:}"
  shift
  until nc -z "$host" "$port"; do
    echo "waiting for $host:$port"
    sleep 1
  done
done

[ "$1" = "--" ] && shift
exec "$@"
"#;
