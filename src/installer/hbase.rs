//! Apache HBase installer.
//!
//! Runs a custom-built standalone HBase image started in `master` mode, with
//! three published port roles (master UI, region server, ZooKeeper). The
//! configuration snapshot comes from the in-container extractor reading
//! `hbase-site.xml`.

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

const IMAGE_TAG: &str = "toolforge-hbase";
const HBASE_HOME: &str = "/hbase-2.1.3";
const SITE_XML: &str = "/hbase-2.1.3/conf/hbase-site.xml";

const MASTER_PORT: u16 = 16010;
const REGIONSERVER_PORT: u16 = 16020;
const ZOOKEEPER_PORT: u16 = 2181;

fn profile(app: &AppConfig) -> ToolProfile {
    ToolProfile {
        kind: ToolKind::HBase,
        image: ImageSource::Build {
            tag: IMAGE_TAG.to_string(),
            context: env::build_context_path(&app.build_context_root, env::build_context::HBASE),
        },
        ports: vec![
            PortSpec {
                role: PortRole::Master,
                default_host_port: MASTER_PORT,
                container_port: MASTER_PORT,
                scan: PortRange::new(16000, 16100),
            },
            PortSpec {
                role: PortRole::RegionServer,
                default_host_port: REGIONSERVER_PORT,
                container_port: REGIONSERVER_PORT,
                scan: PortRange::new(16000, 16100),
            },
            PortSpec {
                role: PortRole::Zookeeper,
                default_host_port: ZOOKEEPER_PORT,
                container_port: ZOOKEEPER_PORT,
                scan: PortRange::new(2181, 2281),
            },
        ],
        credential_env: Some(("HBASE_USER", "HBASE_PASSWORD")),
        extra_env: vec![],
        volume_target: None,
        run_cmd: Some(vec!["master".to_string()]),
        readiness_probe: vec!["ls".to_string(), HBASE_HOME.to_string()],
        extractor_cmd: Some(vec![
            "/usr/local/bin/confext".to_string(),
            "--file".to_string(),
            SITE_XML.to_string(),
        ]),
    }
}

/// HBase instance installer.
pub struct HBaseInstaller {
    engine: LifecycleEngine,
}

impl HBaseInstaller {
    /// Create an installer for one HBase instance.
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
}

#[async_trait]
impl Installer for HBaseInstaller {
    fn kind(&self) -> ToolKind {
        ToolKind::HBase
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
        assert_eq!(p.kind, ToolKind::HBase);
        assert_eq!(p.image.tag(), IMAGE_TAG);
        assert!(matches!(&p.image, ImageSource::Build { context, .. }
            if context.ends_with("docker/hbase")));

        assert_eq!(p.ports.len(), 3);
        assert_eq!(
            p.port_spec(PortRole::Master).unwrap().default_host_port,
            16010
        );
        assert_eq!(
            p.port_spec(PortRole::RegionServer).unwrap().default_host_port,
            16020
        );
        assert_eq!(
            p.port_spec(PortRole::Zookeeper).unwrap().default_host_port,
            2181
        );

        assert_eq!(p.run_cmd.as_deref(), Some(&["master".to_string()][..]));
        assert!(p.volume_target.is_none());
        assert!(p.extractor_cmd.is_some());
    }

    #[test]
    fn master_and_regionserver_share_a_scan_range() {
        let p = profile(&AppConfig::default());
        assert_eq!(
            p.port_spec(PortRole::Master).unwrap().scan,
            p.port_spec(PortRole::RegionServer).unwrap().scan
        );
    }
}
