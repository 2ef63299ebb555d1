//! devstack brings up one project's local development environment.
//!
//! A project directory carries a `devstack.json` descriptor. From it the crate
//! synthesizes a compose file and the application server's bootstrap sources,
//! runs the containers, supervises the processes that live outside them (log
//! follower, frontend dev server, contract rebuilds, tunnel) and tears the
//! whole thing down when the session is interrupted.

pub mod admin;
pub mod credentials;
pub mod menu;
pub mod models;
pub mod paths;
pub mod reset;
pub mod runtime;
pub mod session;
pub mod synth;
