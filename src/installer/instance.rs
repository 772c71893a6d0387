//! Instance configuration and derived records.

use crate::installer::{InstallerError, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Flat configuration snapshot of a managed service. Not versioned; every
/// read is a fresh snapshot.
pub type ConfigRecord = BTreeMap<String, String>;

/// Logical role of a published port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PortRole {
    /// The tool's single default port
    Default,
    /// HBase master UI
    Master,
    /// HBase region server
    RegionServer,
    /// HBase coordination (ZooKeeper)
    Zookeeper,
}

impl std::fmt::Display for PortRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortRole::Default => write!(f, "default"),
            PortRole::Master => write!(f, "master"),
            PortRole::RegionServer => write!(f, "regionserver"),
            PortRole::Zookeeper => write!(f, "zookeeper"),
        }
    }
}

impl std::str::FromStr for PortRole {
    type Err = InstallerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(PortRole::Default),
            "master" => Ok(PortRole::Master),
            "regionserver" => Ok(PortRole::RegionServer),
            "zookeeper" => Ok(PortRole::Zookeeper),
            other => Err(InstallerError::InvalidConfig(format!(
                "unknown port role: {}",
                other
            ))),
        }
    }
}

/// Desired configuration for one tool instance.
///
/// `container_name` uniquely identifies at most one live managed container;
/// reusing a name while that container exists is a conflict, not a new
/// instance. Owned mutably by one installer for the duration of a lifecycle
/// call; port substitutions during `install` are written back here.
#[derive(Debug, Clone)]
pub struct ToolInstanceConfig {
    /// Unique container name
    pub container_name: String,
    /// Service username (tool-specific default applied when unset)
    pub username: Option<String>,
    /// Service password (tool-specific default applied when unset)
    pub password: Option<String>,
    /// Requested host ports by role; effective ports after `install`
    pub ports: BTreeMap<PortRole, u16>,
    /// Host path override for persistent storage
    pub volume: Option<PathBuf>,
}

impl ToolInstanceConfig {
    /// Create a configuration for a named instance.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::InvalidConfig`] if the name fails validation.
    pub fn new(container_name: impl Into<String>) -> Result<Self> {
        let container_name = container_name.into();
        validate_container_name(&container_name)?;
        Ok(Self {
            container_name,
            username: None,
            password: None,
            ports: BTreeMap::new(),
            volume: None,
        })
    }

    /// Set service credentials.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Request a host port for a role.
    pub fn with_port(mut self, role: PortRole, port: u16) -> Self {
        self.ports.insert(role, port);
        self
    }

    /// Set a host volume path.
    pub fn with_volume(mut self, volume: PathBuf) -> Self {
        self.volume = Some(volume);
        self
    }

    /// The port currently recorded for a role, if any.
    pub fn port(&self, role: PortRole) -> Option<u16> {
        self.ports.get(&role).copied()
    }
}

/// Validate a container name against the runtime's name charset.
///
/// Names become runtime identifiers and filesystem path components, so they
/// are restricted to `[A-Za-z0-9][A-Za-z0-9_.-]*` before any call is made.
///
/// # Errors
///
/// Returns [`InstallerError::InvalidConfig`] for empty or out-of-charset names.
pub fn validate_container_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            first.is_ascii_alphanumeric()
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(InstallerError::InvalidConfig(format!(
            "container name {:?} must match [A-Za-z0-9][A-Za-z0-9_.-]*",
            name
        )))
    }
}
