//! toolforge: lifecycle management for single-container tool instances.
//!
//! Provisions, verifies, reconfigures, and removes containerized developer
//! tools (Apache Spark, MongoDB, Apache HBase) against a local Docker or
//! Podman runtime. Each tool implements the same [`installer::Installer`]
//! contract on top of a shared lifecycle engine; per-tool behavior is data
//! (a [`installer::ToolProfile`]), not code.
//!
//! The crate ships two binaries: `toolforge`, the operator-facing CLI, and
//! `confext`, the configuration extractor baked into tool images and invoked
//! in-container over exec.

pub mod cli;
pub mod config;
pub mod env;
pub mod executor;
pub mod extractor;
pub mod installer;
pub mod ports;
pub mod runtime;

pub use config::AppConfig;
pub use installer::{Installer, InstallerError, ToolInstanceConfig, ToolKind};
pub use runtime::{RuntimeClient, RuntimeError};
