//! Installer lifecycle protocol.
//!
//! Each managed tool (Spark, MongoDB, HBase) gets an installer implementing
//! the same contract: prerequisite check, install, readiness test,
//! configuration retrieval, reconfiguration by stop-and-recreate, and
//! best-effort rollback. The per-tool types parameterize a shared
//! [`lifecycle::LifecycleEngine`] through a [`ToolProfile`]; the set of tools
//! is a closed enum resolved at startup, so an unsupported tool is a parse
//! error rather than a runtime reflection failure.

mod hbase;
mod instance;
mod lifecycle;
mod mongodb;
mod output;
mod profile;
mod spark;

pub use hbase::HBaseInstaller;
pub use instance::{ConfigRecord, PortRole, ToolInstanceConfig};
pub use lifecycle::LifecycleEngine;
pub use mongodb::MongoDbInstaller;
pub use output::{extract_json_object, parse_config_record};
pub use profile::{PortSpec, ToolProfile};
pub use spark::SparkInstaller;

use crate::config::AppConfig;
use crate::ports::PortError;
use crate::runtime::RuntimeError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Installer lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum InstallerError {
    /// Container runtime unreachable; nothing was mutated
    #[error("prerequisite check failed: {0}")]
    Prerequisite(String),

    /// No free port in the tool's scan range
    #[error(transparent)]
    PortExhaustion(#[from] PortError),

    /// Instance configuration rejected before any runtime call
    #[error("invalid instance config: {0}")]
    InvalidConfig(String),

    /// Image build or container start failed; caller should roll back
    #[error("install failed: {0}")]
    Install(String),

    /// Old container still present after the bounded removal wait
    #[error("container {name} still present after {timeout:?}")]
    RemovalTimeout {
        /// Container name
        name: String,
        /// Timeout that elapsed
        timeout: Duration,
    },

    /// Readiness probe kept failing for the bounded readiness wait
    #[error("container {name} not ready after {timeout:?}")]
    ReadinessTimeout {
        /// Container name
        name: String,
        /// Timeout that elapsed
        timeout: Duration,
    },

    /// Exec into the container failed; retriable by the caller
    #[error("configuration retrieval failed: {0}")]
    ConfigRetrieval(String),

    /// Extractor output contained no parseable JSON object
    #[error("configuration output not parseable: {0}")]
    ConfigParse(String),

    /// Instance did not come back verified after reconfiguration
    #[error("instance not functional after restart: {0}")]
    RestartVerification(String),

    /// Underlying runtime failure
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Result type for installer operations.
pub type Result<T> = std::result::Result<T, InstallerError>;

/// Coarse progress callback (0..=100).
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Progress reporter that logs each step.
pub fn log_progress() -> ProgressFn {
    Arc::new(|percent| info!("Progress: {}%", percent))
}

/// Per-name mutual exclusion for lifecycle calls.
///
/// Two concurrent mutating calls against the same `container_name` would race
/// at the runtime; each call holds its name's lock for its full duration, and
/// the guard releases on every exit path.
#[derive(Default)]
pub struct InstanceLocks {
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl InstanceLocks {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock for a container name, created on first use.
    pub fn lock_for(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

/// The tools this system can manage. Closed set; dispatch is an exhaustive
/// match, never runtime reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    /// Apache Spark (custom image, single UI port)
    Spark,
    /// MongoDB (registry image, single port)
    MongoDb,
    /// Apache HBase (custom image, master/regionserver/zookeeper ports)
    HBase,
}

impl ToolKind {
    /// All supported tools.
    pub const ALL: [ToolKind; 3] = [ToolKind::Spark, ToolKind::MongoDb, ToolKind::HBase];

    /// Construct the installer for this tool.
    pub fn installer(
        self,
        app: &AppConfig,
        config: ToolInstanceConfig,
        progress: ProgressFn,
        locks: Arc<InstanceLocks>,
    ) -> Box<dyn Installer> {
        match self {
            ToolKind::Spark => Box::new(SparkInstaller::new(app, config, progress, locks)),
            ToolKind::MongoDb => Box::new(MongoDbInstaller::new(app, config, progress, locks)),
            ToolKind::HBase => Box::new(HBaseInstaller::new(app, config, progress, locks)),
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolKind::Spark => write!(f, "spark"),
            ToolKind::MongoDb => write!(f, "mongodb"),
            ToolKind::HBase => write!(f, "hbase"),
        }
    }
}

impl std::str::FromStr for ToolKind {
    type Err = InstallerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "spark" => Ok(ToolKind::Spark),
            "mongodb" | "mongo" => Ok(ToolKind::MongoDb),
            "hbase" => Ok(ToolKind::HBase),
            other => Err(InstallerError::InvalidConfig(format!(
                "unsupported tool: {}",
                other
            ))),
        }
    }
}

/// The lifecycle contract every managed tool satisfies.
///
/// All operations are synchronous from the caller's point of view: each call
/// blocks until the underlying runtime calls complete. `rollback` is the sole
/// best-effort operation; it never fails.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Which tool this installer manages.
    fn kind(&self) -> ToolKind;

    /// The live instance configuration, including any port substitutions
    /// written back during `install`.
    fn config(&self) -> &ToolInstanceConfig;

    /// Verify the container runtime is reachable via a version probe.
    async fn check_prerequisites(&self) -> Result<()>;

    /// Resolve ports, ensure the image, and start the instance container.
    async fn install(&mut self) -> Result<()>;

    /// True iff the named container is listed as running.
    async fn test_installation(&self) -> Result<bool>;

    /// Force-remove the instance container. Idempotent and best-effort:
    /// failures are logged, never raised.
    async fn rollback(&self);

    /// Snapshot of the managed service's effective configuration.
    async fn get_configuration(&self) -> Result<ConfigRecord>;

    /// Stop and recreate the instance with a new configuration, blocking
    /// until the replacement is confirmed ready and running.
    async fn restart_with_new_config(&mut self, new_config: ConfigRecord) -> Result<()>;
}
