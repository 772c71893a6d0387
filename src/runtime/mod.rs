//! Container runtime client.
//!
//! Facade over the Docker/Podman API (via bollard) used to start, stop,
//! inspect, and execute inside managed containers. Custom images are built
//! through the Docker CLI; everything else goes through the API.
//!
//! Components:
//!
//! - [`client`]: connection management and inspect-derived queries
//! - [`containers`]: mutating container operations (run/stop/remove/list)
//! - [`spec`]: container specification builder
//! - [`exec`]: command execution inside running containers
//! - [`image`]: image availability (registry pull or CLI build)

mod client;
mod containers;
mod exec;
mod image;
mod spec;

pub use client::{InspectRecord, InstanceState, RuntimeClient};
pub use containers::ContainerSummary;
pub use exec::ExecOutput;
pub use image::{ImageBuilder, ImageSource};
pub use spec::{ContainerSpec, ContainerSpecBuilder};

/// Container runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Docker/Podman API error
    #[error("runtime API error: {0}")]
    Api(#[from] bollard::errors::Error),

    /// Container not found
    #[error("container not found: {0}")]
    NotFound(String),

    /// Invalid container specification
    #[error("container spec error: {0}")]
    Spec(String),

    /// In-container execution error
    #[error("exec error: {0}")]
    Exec(String),

    /// Image build failure
    #[error("image build failed: {0}")]
    Build(String),

    /// Runtime daemon or CLI unreachable
    #[error("runtime unavailable: {0}")]
    Unavailable(String),
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
