//! Per-tool parameterization of the shared lifecycle engine.
//!
//! Each tool differs only in its defaults: ports and scan ranges, image
//! source, credential environment keys, readiness probe, extractor command,
//! and volume mount target. Everything else is the common choreography in
//! [`crate::installer::LifecycleEngine`].

use crate::installer::{PortRole, ToolKind};
use crate::ports::PortRange;
use crate::runtime::ImageSource;

/// One published port: its role, defaults, and fallback scan range.
#[derive(Debug, Clone)]
pub struct PortSpec {
    /// Logical role
    pub role: PortRole,
    /// Host port used when the caller requests none
    pub default_host_port: u16,
    /// Port the service listens on inside the container
    pub container_port: u16,
    /// Range scanned when the requested port is occupied
    pub scan: PortRange,
}

/// Variation points for one tool.
#[derive(Debug, Clone)]
pub struct ToolProfile {
    /// Which tool this profile describes
    pub kind: ToolKind,
    /// Image to run instances from
    pub image: ImageSource,
    /// Published ports
    pub ports: Vec<PortSpec>,
    /// Environment keys carrying the service credentials (user, password)
    pub credential_env: Option<(&'static str, &'static str)>,
    /// Fixed additional environment entries
    pub extra_env: Vec<(&'static str, &'static str)>,
    /// Container path the instance volume mounts at, if the tool persists data
    pub volume_target: Option<&'static str>,
    /// Command appended to the image's entrypoint, if any
    pub run_cmd: Option<Vec<String>>,
    /// In-container probe that succeeds once the instance is usable
    pub readiness_probe: Vec<String>,
    /// In-container command emitting the configuration snapshot; None means
    /// the configuration is derived from runtime inspection instead
    pub extractor_cmd: Option<Vec<String>>,
}

impl ToolProfile {
    /// The port spec for a role, if the tool publishes it.
    pub fn port_spec(&self, role: PortRole) -> Option<&PortSpec> {
        self.ports.iter().find(|spec| spec.role == role)
    }
}
