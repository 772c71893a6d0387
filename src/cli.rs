//! Command-line surface.
//!
//! Subcommands map 1:1 to the installer lifecycle contract. Every command
//! blocks until its lifecycle calls complete and exits non-zero with the
//! error message on any fatal failure.

use crate::config::AppConfig;
use crate::installer::{
    ConfigRecord, InstanceLocks, Installer, PortRole, ToolInstanceConfig, ToolKind, log_progress,
};
use crate::runtime::RuntimeClient;
use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Attempts of the post-install running check. Containers that crash on
/// startup (bad credentials, port clash inside the container) typically die
/// within the first few seconds.
const TEST_ATTEMPTS: u32 = 5;
const TEST_DELAY: Duration = Duration::from_secs(2);

/// Manage single-container tool instances (Spark, MongoDB, HBase).
#[derive(Parser)]
#[command(name = "toolforge", version, about)]
pub struct Cli {
    /// Path to a toolforge.toml configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Install and start a tool instance, verifying it stays up
    Start {
        /// Tool to run (spark, mongodb, hbase)
        tool: ToolKind,
        /// Container name for the instance
        name: String,
        /// Service username
        #[arg(long)]
        username: Option<String>,
        /// Service password
        #[arg(long)]
        password: Option<String>,
        /// Host port request, as `port` or `role=port` (role: default,
        /// master, regionserver, zookeeper); repeatable
        #[arg(long = "port", value_parser = parse_port_arg)]
        ports: Vec<(PortRole, u16)>,
        /// Host path for the instance volume (defaults under the data root)
        #[arg(long)]
        volume: Option<PathBuf>,
    },

    /// Stop and remove a tool instance
    Stop {
        /// Tool the instance runs
        tool: ToolKind,
        /// Container name of the instance
        name: String,
    },

    /// Report whether an instance is present and running
    Status {
        /// Tool the instance runs
        tool: ToolKind,
        /// Container name of the instance
        name: String,
    },

    /// Print the instance's effective configuration as JSON
    Config {
        /// Tool the instance runs
        tool: ToolKind,
        /// Container name of the instance
        name: String,
    },

    /// Recreate an instance with new configuration entries
    UpdateConfig {
        /// Tool the instance runs
        tool: ToolKind,
        /// Container name of the instance
        name: String,
        /// Configuration entry as key=value; repeatable
        #[arg(long = "set", required = true)]
        set: Vec<String>,
        /// Host port override, as `port` or `role=port`; roles left unset
        /// keep the ports the running instance publishes
        #[arg(long = "port", value_parser = parse_port_arg)]
        ports: Vec<(PortRole, u16)>,
        /// Host path for the instance volume (defaults under the data root)
        #[arg(long)]
        volume: Option<PathBuf>,
    },

    /// List managed containers
    List {
        /// Include stopped containers
        #[arg(long)]
        all: bool,
    },
}

/// Parse a `--port` argument: bare `8085` targets the default role,
/// `master=16011` targets a named role.
fn parse_port_arg(s: &str) -> Result<(PortRole, u16), String> {
    let (role, port) = match s.split_once('=') {
        Some((role, port)) => (role.parse::<PortRole>().map_err(|e| e.to_string())?, port),
        None => (PortRole::Default, s),
    };
    let port: u16 = port
        .parse()
        .map_err(|_| format!("invalid port number: {:?}", port))?;
    Ok((role, port))
}

/// Parse `--set key=value` pairs into a configuration record.
fn parse_set_pairs(pairs: &[String]) -> anyhow::Result<ConfigRecord> {
    let mut record = ConfigRecord::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("--set {:?} is not of the form key=value", pair);
        };
        if key.is_empty() {
            bail!("--set {:?} has an empty key", pair);
        }
        record.insert(key.to_string(), value.to_string());
    }
    Ok(record)
}

fn build_installer(
    app: &AppConfig,
    tool: ToolKind,
    name: &str,
    username: Option<String>,
    password: Option<String>,
    ports: &[(PortRole, u16)],
    volume: Option<PathBuf>,
) -> anyhow::Result<Box<dyn Installer>> {
    let mut config = ToolInstanceConfig::new(name)?;
    if let (Some(username), Some(password)) = (username, password) {
        config = config.with_credentials(username, password);
    }
    for &(role, port) in ports {
        config = config.with_port(role, port);
    }
    if let Some(volume) = volume {
        config = config.with_volume(volume);
    }

    let locks = Arc::new(InstanceLocks::new());
    Ok(tool.installer(app, config, log_progress(), locks))
}

/// Execute a parsed command.
///
/// # Errors
///
/// Returns the first fatal lifecycle or runtime error; `main` renders it and
/// exits 1.
pub async fn run(cli: Cli, app: AppConfig) -> anyhow::Result<()> {
    match cli.command {
        Command::Start {
            tool,
            name,
            username,
            password,
            ports,
            volume,
        } => {
            let mut installer = build_installer(&app, tool, &name, username, password, &ports, volume)?;
            start(installer.as_mut(), &name).await
        }
        Command::Stop { tool, name } => {
            let installer = build_installer(&app, tool, &name, None, None, &[], None)?;
            installer.rollback().await;
            println!("Removed {} instance '{}'", tool, name);
            Ok(())
        }
        Command::Status { tool, name } => {
            let installer = build_installer(&app, tool, &name, None, None, &[], None)?;
            let client = RuntimeClient::connect().await?;
            let state = client.instance_state(&name).await?;
            let running = installer.test_installation().await?;
            println!(
                "{} instance '{}': {} ({})",
                tool,
                name,
                state,
                if running { "running" } else { "not running" }
            );
            Ok(())
        }
        Command::Config { tool, name } => {
            let installer = build_installer(&app, tool, &name, None, None, &[], None)?;
            let config = installer.get_configuration().await?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::UpdateConfig {
            tool,
            name,
            set,
            ports,
            volume,
        } => {
            let new_config = parse_set_pairs(&set)?;
            let mut installer = build_installer(&app, tool, &name, None, None, &ports, volume)?;
            installer
                .restart_with_new_config(new_config)
                .await
                .with_context(|| format!("reconfiguration of '{}' failed", name))?;
            println!("Restarted {} instance '{}' with new configuration", tool, name);
            Ok(())
        }
        Command::List { all } => {
            let client = RuntimeClient::connect().await?;
            let containers = client.list_managed(all).await?;
            if containers.is_empty() {
                println!("No managed containers");
                return Ok(());
            }
            for c in containers {
                let id = c.id.get(..12).unwrap_or(&c.id);
                println!("{}  {}  {}  {}  {}", id, c.name, c.image, c.state, c.status);
            }
            Ok(())
        }
    }
}

/// The start choreography: prerequisites, install, then a bounded retry of
/// the running check. A failed check (or failed install) rolls the instance
/// back so no half-started container is left behind.
async fn start(installer: &mut dyn Installer, name: &str) -> anyhow::Result<()> {
    installer.check_prerequisites().await?;

    if let Err(e) = installer.install().await {
        warn!("Install of '{}' failed, rolling back: {}", name, e);
        installer.rollback().await;
        return Err(e.into());
    }

    for attempt in 1..=TEST_ATTEMPTS {
        if installer.test_installation().await? {
            println!(
                "Started {} instance '{}' (ports: {:?})",
                installer.kind(),
                name,
                installer.config().ports
            );
            return Ok(());
        }
        info!(
            "Instance '{}' not running yet (attempt {}/{})",
            name, attempt, TEST_ATTEMPTS
        );
        tokio::time::sleep(TEST_DELAY).await;
    }

    warn!("Instance '{}' never came up, rolling back", name);
    installer.rollback().await;
    bail!("instance '{}' failed verification after install", name);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_arg_bare_number_is_default_role() {
        assert_eq!(parse_port_arg("8085").unwrap(), (PortRole::Default, 8085));
    }

    #[test]
    fn port_arg_with_role() {
        assert_eq!(
            parse_port_arg("master=16011").unwrap(),
            (PortRole::Master, 16011)
        );
        assert_eq!(
            parse_port_arg("zookeeper=2182").unwrap(),
            (PortRole::Zookeeper, 2182)
        );
    }

    #[test]
    fn port_arg_rejects_garbage() {
        assert!(parse_port_arg("notaport").is_err());
        assert!(parse_port_arg("sidecar=8080").is_err());
        assert!(parse_port_arg("master=70000").is_err());
    }

    #[test]
    fn set_pairs_parse() {
        let record = parse_set_pairs(&[
            "spark.ui.port=8085".to_string(),
            "spark.app.name=demo".to_string(),
        ])
        .unwrap();
        assert_eq!(record["spark.ui.port"], "8085");
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn set_pairs_reject_missing_equals() {
        assert!(parse_set_pairs(&["noequals".to_string()]).is_err());
        assert!(parse_set_pairs(&["=value".to_string()]).is_err());
    }

    #[test]
    fn cli_parses_start() {
        let cli = Cli::try_parse_from([
            "toolforge", "start", "spark", "spark1", "--port", "8085", "--username", "alice",
            "--password", "secret",
        ])
        .unwrap();
        match cli.command {
            Command::Start {
                tool, name, ports, ..
            } => {
                assert_eq!(tool, ToolKind::Spark);
                assert_eq!(name, "spark1");
                assert_eq!(ports, vec![(PortRole::Default, 8085)]);
            }
            _ => panic!("expected start"),
        }
    }

    #[test]
    fn cli_parses_update_config() {
        let cli = Cli::try_parse_from([
            "toolforge",
            "update-config",
            "hbase",
            "hbase1",
            "--set",
            "hbase.cluster.distributed=false",
            "--port",
            "master=16011",
        ])
        .unwrap();
        match cli.command {
            Command::UpdateConfig {
                tool, set, ports, ..
            } => {
                assert_eq!(tool, ToolKind::HBase);
                assert_eq!(set, vec!["hbase.cluster.distributed=false".to_string()]);
                assert_eq!(ports, vec![(PortRole::Master, 16011)]);
            }
            _ => panic!("expected update-config"),
        }
    }

    #[test]
    fn cli_requires_set_for_update_config() {
        assert!(Cli::try_parse_from(["toolforge", "update-config", "spark", "s1"]).is_err());
    }
}
