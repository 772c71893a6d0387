//! Apache Spark installer.
//!
//! Runs a custom-built Spark image exposing the master web UI, with a
//! workspace volume and credentials injected through the environment. The
//! configuration snapshot comes from the in-container extractor reading
//! `spark-defaults.conf`.

use crate::config::AppConfig;
use crate::env;
use crate::installer::{
    ConfigRecord, Installer, InstanceLocks, LifecycleEngine, PortRole, PortSpec, ProgressFn,
    Result, ToolInstanceConfig, ToolKind, ToolProfile,
};
use crate::ports::PortRange;
use crate::runtime::ImageSource;
use async_trait::async_trait;
use std::sync::Arc;

const IMAGE_TAG: &str = "toolforge-spark";
const UI_PORT: u16 = 8080;
const SPARK_HOME: &str = "/opt/bitnami/spark";
const WORKSPACE: &str = "/opt/bitnami/spark/workspace";
const DEFAULTS_CONF: &str = "/opt/bitnami/spark/conf/spark-defaults.conf";

fn profile(app: &AppConfig) -> ToolProfile {
    ToolProfile {
        kind: ToolKind::Spark,
        image: ImageSource::Build {
            tag: IMAGE_TAG.to_string(),
            context: env::build_context_path(&app.build_context_root, env::build_context::SPARK),
        },
        ports: vec![PortSpec {
            role: PortRole::Default,
            default_host_port: UI_PORT,
            container_port: UI_PORT,
            scan: PortRange::new(8000, 9000),
        }],
        credential_env: Some(("SPARK_USER", "SPARK_PASSWORD")),
        extra_env: vec![("HOME", "/home/sparkuser")],
        volume_target: Some(WORKSPACE),
        run_cmd: None,
        readiness_probe: vec!["ls".to_string(), SPARK_HOME.to_string()],
        extractor_cmd: Some(vec![
            "/usr/local/bin/confext".to_string(),
            "--file".to_string(),
            DEFAULTS_CONF.to_string(),
        ]),
    }
}

/// Spark instance installer.
pub struct SparkInstaller {
    engine: LifecycleEngine,
}

impl SparkInstaller {
    /// Create an installer for one Spark instance.
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
impl Installer for SparkInstaller {
    fn kind(&self) -> ToolKind {
        ToolKind::Spark
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
        assert_eq!(p.kind, ToolKind::Spark);
        assert_eq!(p.image.tag(), IMAGE_TAG);
        assert!(matches!(&p.image, ImageSource::Build { context, .. }
            if context.ends_with("docker/spark")));

        let ui = p.port_spec(PortRole::Default).unwrap();
        assert_eq!(ui.default_host_port, 8080);
        assert!(ui.scan.contains(8500));
        assert!(!ui.scan.contains(9000));

        assert_eq!(p.volume_target, Some(WORKSPACE));
        assert!(p.extractor_cmd.is_some());
    }
}
