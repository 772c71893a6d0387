//! MongoDB installer.
//!
//! Runs the official registry image with root credentials injected through
//! the environment and `/data/db` persisted on a host volume. MongoDB has no
//! in-container extractor; its configuration snapshot is derived from runtime
//! inspection of the container.

use crate::config::AppConfig;
use crate::installer::{
    ConfigRecord, Installer, InstanceLocks, LifecycleEngine, PortRole, PortSpec, ProgressFn,
    Result, ToolInstanceConfig, ToolKind, ToolProfile,
};
use crate::ports::PortRange;
use crate::runtime::ImageSource;
use async_trait::async_trait;
use std::sync::Arc;

const IMAGE: &str = "mongo";
const PORT: u16 = 27017;
const DATA_DIR: &str = "/data/db";

fn profile(_app: &AppConfig) -> ToolProfile {
    ToolProfile {
        kind: ToolKind::MongoDb,
        image: ImageSource::Registry(IMAGE.to_string()),
        ports: vec![PortSpec {
            role: PortRole::Default,
            default_host_port: PORT,
            container_port: PORT,
            scan: PortRange::new(27017, 27200),
        }],
        credential_env: Some(("MONGO_INITDB_ROOT_USERNAME", "MONGO_INITDB_ROOT_PASSWORD")),
        extra_env: vec![],
        volume_target: Some(DATA_DIR),
        run_cmd: None,
        readiness_probe: vec!["ls".to_string(), DATA_DIR.to_string()],
        extractor_cmd: None,
    }
}

/// MongoDB instance installer.
pub struct MongoDbInstaller {
    engine: LifecycleEngine,
}

impl MongoDbInstaller {
    /// Create an installer for one MongoDB instance.
    pub fn new(
        app: &AppConfig,
        config: ToolInstanceConfig,
        progress: ProgressFn,
        locks: Arc<InstanceLocks>,
    ) -> Self {
        Self {
            engine: LifecycleEngine::new(
                profile(app),
                config,
                app.data_root.clone(),
                progress,
                locks,
            ),
        }
    }

    #[cfg(test)]
    pub(crate) fn into_engine(self) -> LifecycleEngine {
        self.engine
    }
}

#[async_trait]
impl Installer for MongoDbInstaller {
    fn kind(&self) -> ToolKind {
        ToolKind::MongoDb
    }

    fn config(&self) -> &ToolInstanceConfig {
        self.engine.config()
    }

    async fn check_prerequisites(&self) -> Result<()> {
        self.engine.check_prerequisites().await
    }

    async fn install(&mut self) -> Result<()> {
        self.engine.install().await
    }

    async fn test_installation(&self) -> Result<bool> {
        self.engine.test_installation().await
    }

    async fn rollback(&self) {
        self.engine.rollback().await
    }

    async fn get_configuration(&self) -> Result<ConfigRecord> {
        self.engine.get_configuration().await
    }

    async fn restart_with_new_config(&mut self, new_config: ConfigRecord) -> Result<()> {
        self.engine.restart_with_new_config(new_config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_defaults() {
        let p = profile(&AppConfig::default());
        assert_eq!(p.kind, ToolKind::MongoDb);
        assert_eq!(p.image, ImageSource::Registry("mongo".to_string()));

        let port = p.port_spec(PortRole::Default).unwrap();
        assert_eq!(port.default_host_port, 27017);
        assert_eq!(port.container_port, 27017);
        assert!(port.scan.contains(27100));

        assert_eq!(p.volume_target, Some(DATA_DIR));
        // Configuration is read from inspect, not an in-container extractor.
        assert!(p.extractor_cmd.is_none());
    }
}
