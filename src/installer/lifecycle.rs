//! Shared lifecycle choreography.
//!
//! Every installer runs the same protocol; only the [`ToolProfile`] differs.
//! The engine owns the live [`ToolInstanceConfig`] for the duration of its
//! lifecycle calls and writes effective ports back into it, so later calls on
//! the same installer observe substituted ports rather than the originally
//! requested ones.

use crate::env;
use crate::installer::{
    ConfigRecord, InstallerError, InstanceLocks, ProgressFn, Result, ToolInstanceConfig,
    ToolKind, ToolProfile, output,
};
use crate::ports::{find_available_port, is_port_in_use};
use crate::runtime::{ContainerSpec, ImageBuilder, RuntimeClient, RuntimeError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Bounded wait for the old container to disappear during reconfiguration.
const REMOVAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounded wait for the readiness probe after a restart.
const READINESS_TIMEOUT: Duration = Duration::from_secs(20);

/// Fixed polling interval for both waits.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Credentials applied when the caller sets none.
const DEFAULT_USERNAME: &str = "admin";
const DEFAULT_PASSWORD: &str = "password";

/// The common lifecycle engine behind every installer.
pub struct LifecycleEngine {
    profile: ToolProfile,
    config: ToolInstanceConfig,
    data_root: PathBuf,
    progress: ProgressFn,
    locks: Arc<InstanceLocks>,
    client: OnceCell<RuntimeClient>,
}

impl LifecycleEngine {
    /// Create an engine for one instance of one tool.
    pub fn new(
        profile: ToolProfile,
        config: ToolInstanceConfig,
        data_root: PathBuf,
        progress: ProgressFn,
        locks: Arc<InstanceLocks>,
    ) -> Self {
        Self {
            profile,
            config,
            data_root,
            progress,
            locks,
            client: OnceCell::new(),
        }
    }

    /// Which tool this engine manages.
    pub fn kind(&self) -> ToolKind {
        self.profile.kind
    }

    /// The live instance configuration.
    pub fn config(&self) -> &ToolInstanceConfig {
        &self.config
    }

    /// Lazily connected runtime client. Connecting here rather than in the
    /// constructor keeps "runtime unreachable" a lifecycle-call error.
    async fn client(&self) -> crate::runtime::Result<&RuntimeClient> {
        self.client.get_or_try_init(RuntimeClient::connect).await
    }

    /// Verify the runtime answers a version probe.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Prerequisite`] if the runtime is unreachable.
    /// Fatal, not retried, and nothing has been mutated yet.
    pub async fn check_prerequisites(&self) -> Result<()> {
        let client = self
            .client()
            .await
            .map_err(|e| InstallerError::Prerequisite(e.to_string()))?;

        let version = client
            .version()
            .await
            .map_err(|e| InstallerError::Prerequisite(e.to_string()))?;

        info!("Container runtime available (version {})", version);
        (self.progress)(10);
        Ok(())
    }

    /// Bring up the instance container.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::PortExhaustion`] when no fallback port is
    /// free and [`InstallerError::Install`] when the image or container start
    /// fails. A name conflict with an existing container surfaces as the
    /// runtime's conflict error; the caller decides whether to roll back.
    pub async fn install(&mut self) -> Result<()> {
        let lock = self.locks.lock_for(&self.config.container_name);
        let _guard = lock.lock().await;

        self.resolve_ports()?;

        let client = self.client().await?;
        let images = ImageBuilder::new(client.clone());
        images
            .ensure(&self.profile.image)
            .await
            .map_err(|e| InstallerError::Install(e.to_string()))?;
        (self.progress)(40);

        self.ensure_volume_dir()?;

        let spec = self.build_spec(None)?;
        info!(
            "Starting {} instance '{}' with ports {:?}",
            self.profile.kind, self.config.container_name, self.config.ports
        );

        client
            .run(&spec, &self.config.container_name)
            .await
            .map_err(|e| InstallerError::Install(e.to_string()))?;

        (self.progress)(100);
        Ok(())
    }

    /// True iff the named container is listed as running. Single probe; the
    /// caller owns any retry policy for start-up latency.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime query fails.
    pub async fn test_installation(&self) -> Result<bool> {
        Ok(self
            .client()
            .await?
            .is_running(&self.config.container_name)
            .await?)
    }

    /// Force-remove the instance container. Best-effort and idempotent:
    /// removal failures (including "already absent") are logged, never raised.
    pub async fn rollback(&self) {
        let name = self.config.container_name.clone();
        let lock = self.locks.lock_for(&name);
        let _guard = lock.lock().await;

        info!("Rolling back instance '{}'", name);
        match self.client().await {
            Ok(client) => {
                if let Err(e) = client.remove(&name, true).await {
                    warn!("Rollback removal of {} failed: {}", name, e);
                }
            }
            Err(e) => {
                warn!("Rollback of {} skipped, runtime unreachable: {}", name, e);
            }
        }
    }

    /// Snapshot the instance's effective configuration.
    ///
    /// # Errors
    ///
    /// [`InstallerError::ConfigRetrieval`] when the exec (or inspect) itself
    /// fails, a connectivity problem the caller may retry, and
    /// [`InstallerError::ConfigParse`] when the extractor produced no valid
    /// JSON object, which indicates an extractor or tool bug.
    pub async fn get_configuration(&self) -> Result<ConfigRecord> {
        match self.profile.extractor_cmd.clone() {
            Some(cmd) => self.configuration_from_extractor(cmd).await,
            None => self.configuration_from_inspect().await,
        }
    }

    async fn configuration_from_extractor(&self, cmd: Vec<String>) -> Result<ConfigRecord> {
        let name = &self.config.container_name;
        info!("Extracting {} configuration from '{}'", self.profile.kind, name);

        let output = self
            .client()
            .await?
            .exec(name, cmd)
            .await
            .map_err(|e| InstallerError::ConfigRetrieval(e.to_string()))?;

        if !output.success() {
            return Err(InstallerError::ConfigRetrieval(format!(
                "extractor in {} exited with {:?}: {}",
                name,
                output.exit_code,
                output.combined().trim()
            )));
        }

        output::parse_config_record(&output.combined()).map_err(InstallerError::ConfigParse)
    }

    async fn configuration_from_inspect(&self) -> Result<ConfigRecord> {
        let name = &self.config.container_name;
        info!("Reading {} configuration from inspect of '{}'", self.profile.kind, name);

        let record = self
            .client()
            .await?
            .inspect_record(name)
            .await
            .map_err(|e| match e {
                RuntimeError::NotFound(n) => {
                    InstallerError::ConfigRetrieval(format!("container {} not found", n))
                }
                e => InstallerError::Runtime(e),
            })?;

        let mut config = ConfigRecord::new();
        config.insert("id".to_string(), record.id);
        config.insert("name".to_string(), record.name);
        config.insert("status".to_string(), record.status);
        config.insert("image".to_string(), record.image);
        for (container_port, host_ports) in record.ports {
            config.insert(format!("port.{}", container_port), host_ports.join(","));
        }
        for (key, value) in record.env {
            config.insert(key, value);
        }
        Ok(config)
    }

    /// Stop and recreate the instance with `new_config` applied, keeping the
    /// port/volume/label scheme from install. The new entries travel as
    /// container environment and, for tools with an in-container extractor,
    /// are also merged into the native configuration file once the
    /// replacement is ready, so a subsequent configuration read reflects
    /// them.
    ///
    /// # Errors
    ///
    /// [`InstallerError::RemovalTimeout`] if the old container does not
    /// disappear in time (no replacement is started),
    /// [`InstallerError::ReadinessTimeout`] if the readiness probe never
    /// succeeds, and [`InstallerError::RestartVerification`] if the final
    /// running check fails. Either timeout leaves the instance in an
    /// indeterminate state the caller must inspect.
    pub async fn restart_with_new_config(&mut self, new_config: ConfigRecord) -> Result<()> {
        let name = self.config.container_name.clone();
        let lock = self.locks.lock_for(&name);
        let _guard = lock.lock().await;

        info!(
            "Restarting {} instance '{}' with new configuration ({} keys)",
            self.profile.kind,
            name,
            new_config.len()
        );

        // Roles the caller left unset keep the host ports the live container
        // publishes, so a fresh installer does not silently move the
        // instance back to the tool defaults.
        let live = self.client().await?.inspect_record(&name).await;
        if let Ok(record) = live {
            self.adopt_published_ports(&record);
        }

        let client = self.client().await?;
        client.stop_and_remove(&name).await?;
        self.wait_for_removal(&name).await?;

        self.ensure_volume_dir()?;
        let spec = self.build_spec(Some(&new_config))?;
        client
            .run(&spec, &name)
            .await
            .map_err(|e| InstallerError::Install(format!("restart failed: {}", e)))?;

        self.wait_until_ready(&name).await?;

        if let Some(cmd) = self.config_write_cmd(&new_config) {
            let output = client.exec(&name, cmd).await.map_err(|e| {
                InstallerError::Install(format!(
                    "writing new configuration into {} failed: {}",
                    name, e
                ))
            })?;
            if !output.success() {
                return Err(InstallerError::Install(format!(
                    "writing new configuration into {} exited with {:?}: {}",
                    name,
                    output.exit_code,
                    output.combined().trim()
                )));
            }
        }

        if !self.test_installation().await? {
            return Err(InstallerError::RestartVerification(format!(
                "container {} is not running after restart",
                name
            )));
        }
        Ok(())
    }

    /// Extractor invocation that merges `new_config` into the tool's native
    /// configuration file and writes it back. None for inspect-based tools
    /// (the injected environment already carries the entries) and for an
    /// empty record.
    fn config_write_cmd(&self, new_config: &ConfigRecord) -> Option<Vec<String>> {
        let extractor = self.profile.extractor_cmd.as_ref()?;
        if new_config.is_empty() {
            return None;
        }
        let mut cmd = extractor.clone();
        cmd.push("--write".to_string());
        cmd.extend(new_config.iter().map(|(key, value)| format!("{}={}", key, value)));
        Some(cmd)
    }

    /// Adopt the live container's published host ports for any role the
    /// configuration does not set explicitly.
    fn adopt_published_ports(&mut self, record: &crate::runtime::InspectRecord) {
        for spec in &self.profile.ports {
            if self.config.ports.contains_key(&spec.role) {
                continue;
            }
            if let Some(host_port) = record
                .ports
                .get(&format!("{}/tcp", spec.container_port))
                .and_then(|hosts| hosts.first())
                .and_then(|h| h.parse::<u16>().ok())
            {
                info!(
                    "Keeping published port {} for role {}",
                    host_port, spec.role
                );
                self.config.ports.insert(spec.role, host_port);
            }
        }
    }

    /// Resolve every port role to an effective host port, substituting
    /// occupied ports from the tool's scan range and writing the results back
    /// into the live configuration.
    fn resolve_ports(&mut self) -> Result<()> {
        let mut assigned: Vec<u16> = Vec::new();

        for spec in &self.profile.ports {
            let requested = self
                .config
                .ports
                .get(&spec.role)
                .copied()
                .unwrap_or(spec.default_host_port);

            if requested == 0 {
                return Err(InstallerError::InvalidConfig(format!(
                    "port 0 requested for role {}",
                    spec.role
                )));
            }

            let effective = if is_port_in_use(requested) {
                warn!(
                    "Port {} for role {} is already in use, scanning {}..{}",
                    requested, spec.role, spec.scan.start, spec.scan.end
                );

                // A port picked for an earlier role in this pass is not bound
                // yet, so the probe alone cannot exclude it.
                let mut start = if spec.scan.contains(requested) {
                    requested
                } else {
                    spec.scan.start
                };
                let substituted = loop {
                    let candidate = find_available_port(start, spec.scan.end)?;
                    if assigned.contains(&candidate) || candidate == requested {
                        start = candidate.checked_add(1).ok_or(
                            crate::ports::PortError::Exhausted {
                                start: spec.scan.start,
                                end: spec.scan.end,
                            },
                        )?;
                        continue;
                    }
                    break candidate;
                };

                info!("Substituted port {} for role {}", substituted, spec.role);
                substituted
            } else {
                requested
            };

            assigned.push(effective);
            self.config.ports.insert(spec.role, effective);
        }
        Ok(())
    }

    /// Host path for the instance volume: the explicit override or a path
    /// derived deterministically from the container name.
    fn volume_host_path(&self) -> PathBuf {
        self.config.volume.clone().unwrap_or_else(|| {
            env::volume_path(&self.data_root, &self.config.container_name)
        })
    }

    fn ensure_volume_dir(&self) -> Result<()> {
        if self.profile.volume_target.is_none() {
            return Ok(());
        }
        let path = self.volume_host_path();
        std::fs::create_dir_all(&path).map_err(|e| {
            InstallerError::Install(format!("failed to create volume directory {:?}: {}", path, e))
        })
    }

    /// Assemble the container spec shared by install and restart. `extra`
    /// carries reconfiguration entries as additional environment.
    fn build_spec(&self, extra: Option<&ConfigRecord>) -> Result<ContainerSpec> {
        let mut builder = ContainerSpec::builder()
            .image(self.profile.image.tag())
            .label(env::MANAGED_LABEL_KEY, env::MANAGED_LABEL_VALUE)
            .label(env::TOOL_LABEL_KEY, self.profile.kind.to_string());

        if let Some((user_key, pass_key)) = self.profile.credential_env {
            let username = self.config.username.as_deref().unwrap_or(DEFAULT_USERNAME);
            let password = self.config.password.as_deref().unwrap_or(DEFAULT_PASSWORD);
            builder = builder.env(user_key, username).env(pass_key, password);
        }

        for (key, value) in &self.profile.extra_env {
            builder = builder.env(*key, *value);
        }

        if let Some(extra) = extra {
            for (key, value) in extra {
                builder = builder.env(key.clone(), value.clone());
            }
        }

        for spec in &self.profile.ports {
            let host_port = self
                .config
                .ports
                .get(&spec.role)
                .copied()
                .unwrap_or(spec.default_host_port);
            builder = builder.port_binding(spec.container_port, host_port);
        }

        if let Some(target) = self.profile.volume_target {
            builder = builder.bind(format!("{}:{}", self.volume_host_path().display(), target));
        }

        if let Some(cmd) = &self.profile.run_cmd {
            builder = builder.cmd(cmd.clone());
        }

        Ok(builder.build()?)
    }

    async fn wait_for_removal(&self, name: &str) -> Result<()> {
        let attempts = (REMOVAL_TIMEOUT.as_millis() / POLL_INTERVAL.as_millis()) as u32;
        for _ in 0..attempts {
            if self.client().await?.find_by_name(name, true).await?.is_empty() {
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Err(InstallerError::RemovalTimeout {
            name: name.to_string(),
            timeout: REMOVAL_TIMEOUT,
        })
    }

    async fn wait_until_ready(&self, name: &str) -> Result<()> {
        info!("Waiting for '{}' to become ready", name);
        let attempts = (READINESS_TIMEOUT.as_millis() / POLL_INTERVAL.as_millis()) as u32;
        for _ in 0..attempts {
            if let Ok(output) = self
                .client()
                .await?
                .exec(name, self.profile.readiness_probe.clone())
                .await
                && output.success()
            {
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Err(InstallerError::ReadinessTimeout {
            name: name.to_string(),
            timeout: READINESS_TIMEOUT,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::installer::{MongoDbInstaller, PortRole, SparkInstaller, log_progress};
    use crate::runtime::InspectRecord;
    use std::collections::BTreeMap;
    use std::net::{Ipv4Addr, TcpListener};

    fn spark_engine(config: ToolInstanceConfig) -> LifecycleEngine {
        let app = AppConfig::default();
        SparkInstaller::new(&app, config, log_progress(), Arc::new(InstanceLocks::new()))
            .into_engine()
    }

    fn mongo_engine(config: ToolInstanceConfig) -> LifecycleEngine {
        let app = AppConfig::default();
        MongoDbInstaller::new(&app, config, log_progress(), Arc::new(InstanceLocks::new()))
            .into_engine()
    }

    fn inspect_record_with_ports(ports: &[(&str, &str)]) -> InspectRecord {
        InspectRecord {
            id: "abc123".to_string(),
            name: "t1".to_string(),
            status: "running".to_string(),
            image: "toolforge-spark".to_string(),
            ports: ports
                .iter()
                .map(|(container, host)| (container.to_string(), vec![host.to_string()]))
                .collect(),
            env: BTreeMap::new(),
        }
    }

    #[test]
    fn build_spec_carries_labels_ports_and_credentials() {
        let config = ToolInstanceConfig::new("t1")
            .unwrap()
            .with_credentials("alice", "secret")
            .with_port(PortRole::Default, 8085);
        let engine = spark_engine(config);

        let spec = engine.build_spec(None).unwrap();
        assert_eq!(spec.image, "toolforge-spark");
        assert_eq!(spec.labels.get(env::MANAGED_LABEL_KEY).unwrap(), "true");
        assert_eq!(spec.labels.get(env::TOOL_LABEL_KEY).unwrap(), "spark");
        assert!(spec.env.contains(&"SPARK_USER=alice".to_string()));
        assert!(spec.env.contains(&"SPARK_PASSWORD=secret".to_string()));
        assert!(spec.port_bindings.contains_key("8080/tcp"));
    }

    #[test]
    fn build_spec_merges_restart_config_as_env() {
        let engine = spark_engine(ToolInstanceConfig::new("t1").unwrap());

        let mut extra = ConfigRecord::new();
        extra.insert("x".to_string(), "1".to_string());

        let spec = engine.build_spec(Some(&extra)).unwrap();
        assert!(spec.env.contains(&"x=1".to_string()));
    }

    #[test]
    fn default_credentials_applied() {
        let engine = spark_engine(ToolInstanceConfig::new("t1").unwrap());
        let spec = engine.build_spec(None).unwrap();
        assert!(spec.env.contains(&"SPARK_USER=admin".to_string()));
        assert!(spec.env.contains(&"SPARK_PASSWORD=password".to_string()));
    }

    #[test]
    fn resolve_ports_defaults_unset_roles() {
        let mut engine = spark_engine(ToolInstanceConfig::new("t1").unwrap());
        // The Spark UI default may be bound on the test host; either outcome
        // leaves a free effective port recorded.
        engine.resolve_ports().unwrap();
        let port = engine.config().port(PortRole::Default).unwrap();
        assert!(port == 8080 || (8000..9000).contains(&port));
    }

    #[test]
    fn resolve_ports_substitutes_occupied_port() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let occupied = listener.local_addr().unwrap().port();

        let config = ToolInstanceConfig::new("t1")
            .unwrap()
            .with_port(PortRole::Default, occupied);
        let mut engine = spark_engine(config);

        engine.resolve_ports().unwrap();
        let effective = engine.config().port(PortRole::Default).unwrap();
        assert_ne!(effective, occupied);
        assert!((8000..9000).contains(&effective));
    }

    #[test]
    fn resolve_ports_rejects_zero() {
        let config = ToolInstanceConfig::new("t1")
            .unwrap()
            .with_port(PortRole::Default, 0);
        let mut engine = spark_engine(config);
        assert!(matches!(
            engine.resolve_ports(),
            Err(InstallerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn restart_write_command_merges_overrides() {
        let engine = spark_engine(ToolInstanceConfig::new("t1").unwrap());

        let mut extra = ConfigRecord::new();
        extra.insert("spark.ui.port".to_string(), "8085".to_string());
        extra.insert("x".to_string(), "1".to_string());

        let cmd = engine.config_write_cmd(&extra).unwrap();
        assert_eq!(cmd[0], "/usr/local/bin/confext");
        assert!(cmd.contains(&"--write".to_string()));
        assert!(cmd.contains(&"spark.ui.port=8085".to_string()));
        assert!(cmd.contains(&"x=1".to_string()));
    }

    #[test]
    fn inspect_based_tools_skip_config_write() {
        let engine = mongo_engine(ToolInstanceConfig::new("t1").unwrap());

        let mut extra = ConfigRecord::new();
        extra.insert("x".to_string(), "1".to_string());
        assert!(engine.config_write_cmd(&extra).is_none());
    }

    #[test]
    fn empty_record_skips_config_write() {
        let engine = spark_engine(ToolInstanceConfig::new("t1").unwrap());
        assert!(engine.config_write_cmd(&ConfigRecord::new()).is_none());
    }

    #[test]
    fn restart_overrides_survive_extractor_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spark-defaults.conf");
        std::fs::write(&path, "spark.master local[*]\n").unwrap();

        let engine = spark_engine(ToolInstanceConfig::new("t1").unwrap());
        let mut extra = ConfigRecord::new();
        extra.insert("x".to_string(), "1".to_string());

        // Apply the write invocation the engine would exec, against a local
        // copy of the native file, then re-read it the way a configuration
        // query would.
        let cmd = engine.config_write_cmd(&extra).unwrap();
        let overrides: Vec<String> = cmd
            .iter()
            .skip_while(|arg| *arg != "--write")
            .skip(1)
            .cloned()
            .collect();
        crate::extractor::extract(&path, &overrides, true).unwrap();

        let reread = crate::extractor::extract(&path, &[], false).unwrap();
        assert_eq!(reread.get("x").map(String::as_str), Some("1"));
        assert_eq!(reread.get("spark.master").map(String::as_str), Some("local[*]"));
    }

    #[test]
    fn published_ports_adopted_for_unset_roles() {
        let mut engine = spark_engine(ToolInstanceConfig::new("t1").unwrap());
        engine.adopt_published_ports(&inspect_record_with_ports(&[("8080/tcp", "8085")]));
        assert_eq!(engine.config().port(PortRole::Default), Some(8085));
    }

    #[test]
    fn explicit_port_request_wins_over_published() {
        let config = ToolInstanceConfig::new("t1")
            .unwrap()
            .with_port(PortRole::Default, 9005);
        let mut engine = spark_engine(config);
        engine.adopt_published_ports(&inspect_record_with_ports(&[("8080/tcp", "8085")]));
        assert_eq!(engine.config().port(PortRole::Default), Some(9005));
    }

    #[test]
    fn unparseable_published_ports_are_ignored() {
        let mut engine = spark_engine(ToolInstanceConfig::new("t1").unwrap());
        engine.adopt_published_ports(&inspect_record_with_ports(&[("8080/tcp", "not-a-port")]));
        assert_eq!(engine.config().port(PortRole::Default), None);
    }

    #[test]
    fn volume_path_is_derived_from_name() {
        let engine = spark_engine(ToolInstanceConfig::new("spark1").unwrap());
        assert!(engine.volume_host_path().ends_with("data/spark1"));
    }

    #[test]
    fn volume_override_wins() {
        let config = ToolInstanceConfig::new("spark1")
            .unwrap()
            .with_volume(PathBuf::from("/srv/elsewhere"));
        let engine = spark_engine(config);
        assert_eq!(engine.volume_host_path(), PathBuf::from("/srv/elsewhere"));
    }
}
