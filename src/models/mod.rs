//! Domain models for devstack.
//!
//! # Core Concepts
//!
//! ## Persistent Entities
//!
//! - [`ProjectDescriptor`]: What to run for a project directory. One per directory,
//!   stored as `devstack.json` and rewritten after every edit.
//! - [`PluginRegistry`]: Ordered list of server plugins, part of the project descriptor.
//!
//! ## Synthesized Entities
//!
//! These are regenerated from scratch on every start and never compared with
//! earlier versions:
//!
//! - [`EnvironmentDescriptor`]: Service graph handed to the container runtime.
//! - [`PluginBinding`]: A plugin lowered to its container path and category, the
//!   input of bootstrap rendering.

mod environment;
mod plugin;
mod project;

pub use environment::*;
pub use plugin::*;
pub use project::*;
