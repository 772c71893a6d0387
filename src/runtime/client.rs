//! Docker/Podman client wrapper.
//!
//! Connection handling with fallback strategies, plus inspect-derived queries:
//! instance state, container identity, and the flattened inspect record the
//! installers expose to callers.

use crate::runtime::{Result, RuntimeError};
use bollard::Docker;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Derived state of a managed instance. Computed from the runtime on demand;
/// the runtime is the single source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// No container with this name exists
    Absent,
    /// Container exists and is running
    Running,
    /// Container exists but is not running
    Exited,
    /// Container exists but its state could not be determined
    Unknown,
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceState::Absent => write!(f, "absent"),
            InstanceState::Running => write!(f, "running"),
            InstanceState::Exited => write!(f, "exited"),
            InstanceState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Flattened container metadata from inspect.
#[derive(Debug, Clone)]
pub struct InspectRecord {
    /// Container ID
    pub id: String,
    /// Container name (without the leading slash)
    pub name: String,
    /// Status string as reported by the runtime
    pub status: String,
    /// Image tag
    pub image: String,
    /// Published ports: container port/proto -> host ports
    pub ports: BTreeMap<String, Vec<String>>,
    /// Environment variables
    pub env: BTreeMap<String, String>,
}

/// Docker/Podman API client wrapper.
///
/// Connects to Docker first, then falls back to Podman sockets.
#[derive(Clone)]
pub struct RuntimeClient {
    docker: Arc<Docker>,
}

impl RuntimeClient {
    /// Connect to the container runtime and verify it answers.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Unavailable`] if neither Docker nor Podman can
    /// be reached.
    pub async fn connect() -> Result<Self> {
        let docker = Self::connect_daemon().await?;
        let client = Self {
            docker: Arc::new(docker),
        };
        client.ping().await?;
        Ok(client)
    }

    /// Connection strategies, in order:
    /// 1. Local defaults (Unix socket or Windows named pipe)
    /// 2. Rootless Podman socket
    /// 3. System Podman socket
    async fn connect_daemon() -> Result<Docker> {
        debug!("Connecting to container runtime...");

        match Docker::connect_with_local_defaults() {
            Ok(docker) => {
                info!("Connected to container runtime via local defaults");
                return Ok(docker);
            }
            Err(e) => {
                debug!("Local defaults failed: {}", e);
            }
        }

        #[cfg(unix)]
        {
            if let Ok(home) = std::env::var("HOME") {
                let podman_socket = format!("unix://{}/run/podman/podman.sock", home);
                debug!("Trying Podman socket: {}", podman_socket);

                match Docker::connect_with_socket(&podman_socket, 120, bollard::API_DEFAULT_VERSION)
                {
                    Ok(docker) => {
                        info!("Connected to Podman via rootless socket");
                        return Ok(docker);
                    }
                    Err(e) => {
                        debug!("Podman rootless socket failed: {}", e);
                    }
                }
            }

            let system_socket = "unix:///run/podman/podman.sock";
            debug!("Trying system Podman socket: {}", system_socket);

            match Docker::connect_with_socket(system_socket, 120, bollard::API_DEFAULT_VERSION) {
                Ok(docker) => {
                    info!("Connected to Podman via system socket");
                    return Ok(docker);
                }
                Err(e) => {
                    debug!("Podman system socket failed: {}", e);
                }
            }
        }

        Err(RuntimeError::Unavailable(
            "failed to connect to Docker or Podman; ensure a container runtime is installed and running".to_string(),
        ))
    }

    /// Ping the runtime daemon.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Unavailable`] if the ping fails.
    pub async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map_err(|e| RuntimeError::Unavailable(format!("ping failed: {}", e)))?;
        debug!("Runtime ping successful");
        Ok(())
    }

    /// Version information from the runtime, as a display string.
    ///
    /// # Errors
    ///
    /// Returns an error if the version query fails.
    pub async fn version(&self) -> Result<String> {
        let version = self
            .docker
            .version()
            .await
            .map_err(|e| RuntimeError::Unavailable(format!("version query failed: {}", e)))?;
        Ok(version.version.unwrap_or_else(|| "unknown".to_string()))
    }

    /// Get the underlying Docker client for direct API access.
    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    /// Check if an image exists locally.
    ///
    /// # Errors
    ///
    /// Returns an error if image inspection fails for reasons other than 404.
    pub async fn image_exists(&self, image: &str) -> Result<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(RuntimeError::Api(e)),
        }
    }

    /// Derive the instance state for a container name.
    ///
    /// # Errors
    ///
    /// Returns an error only for API failures; a missing container maps to
    /// [`InstanceState::Absent`].
    pub async fn instance_state(&self, name: &str) -> Result<InstanceState> {
        let inspect = match self
            .docker
            .inspect_container(
                name,
                None::<bollard::query_parameters::InspectContainerOptions>,
            )
            .await
        {
            Ok(inspect) => inspect,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => return Ok(InstanceState::Absent),
            Err(e) => return Err(RuntimeError::Api(e)),
        };

        let Some(state) = inspect.state else {
            return Ok(InstanceState::Unknown);
        };

        if state.running.unwrap_or(false) {
            Ok(InstanceState::Running)
        } else {
            Ok(InstanceState::Exited)
        }
    }

    /// Inspect a container and flatten the metadata the callers care about:
    /// identity, status, image, published ports, and environment.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::NotFound`] if no such container exists.
    pub async fn inspect_record(&self, name: &str) -> Result<InspectRecord> {
        let inspect = self
            .docker
            .inspect_container(
                name,
                None::<bollard::query_parameters::InspectContainerOptions>,
            )
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => RuntimeError::NotFound(name.to_string()),
                e => RuntimeError::Api(e),
            })?;

        let status = inspect
            .state
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let config = inspect.config.unwrap_or_default();

        let mut env = BTreeMap::new();
        for entry in config.env.unwrap_or_default() {
            if let Some((key, value)) = entry.split_once('=') {
                env.insert(key.to_string(), value.to_string());
            }
        }

        let mut ports = BTreeMap::new();
        if let Some(port_map) = inspect.network_settings.and_then(|n| n.ports) {
            for (container_port, bindings) in port_map {
                let host_ports = bindings
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|b| b.host_port)
                    .collect();
                ports.insert(container_port, host_ports);
            }
        }

        Ok(InspectRecord {
            id: inspect.id.unwrap_or_default(),
            name: inspect
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_else(|| name.to_string()),
            status,
            image: config.image.unwrap_or_default(),
            ports,
            env,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_state_display() {
        assert_eq!(InstanceState::Absent.to_string(), "absent");
        assert_eq!(InstanceState::Running.to_string(), "running");
        assert_eq!(InstanceState::Exited.to_string(), "exited");
        assert_eq!(InstanceState::Unknown.to_string(), "unknown");
    }

    #[tokio::test]
    #[ignore] // Requires Docker/Podman to be running
    async fn client_connection() {
        let client = RuntimeClient::connect().await.unwrap();
        client.ping().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    async fn version_probe() {
        let client = RuntimeClient::connect().await.unwrap();
        let version = client.version().await.unwrap();
        assert!(!version.is_empty());
    }

    #[tokio::test]
    #[ignore]
    async fn absent_container_state() {
        let client = RuntimeClient::connect().await.unwrap();
        let state = client
            .instance_state("toolforge-no-such-container")
            .await
            .unwrap();
        assert_eq!(state, InstanceState::Absent);
    }
}
