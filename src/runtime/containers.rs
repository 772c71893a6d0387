//! Mutating container operations.
//!
//! Create/start, stop, remove, and list operations on [`RuntimeClient`].
//! Every invocation is logged with the literal operation issued.

use crate::env;
use crate::runtime::{ContainerSpec, Result, RuntimeClient, RuntimeError};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Stop grace period before the runtime kills the container.
const STOP_TIMEOUT_SECS: i64 = 10;

/// Summary of a listed container.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    /// Container ID
    pub id: String,
    /// Container name (without the leading slash)
    pub name: String,
    /// Image name
    pub image: String,
    /// Container state (running, exited, ...)
    pub state: String,
    /// Human-readable status
    pub status: String,
}

impl RuntimeClient {
    /// Create and start a container from a specification.
    ///
    /// Returns the container ID.
    ///
    /// # Errors
    ///
    /// Returns an error if creation or start fails; a name conflict surfaces
    /// as the runtime's conflict error, not a silent replacement.
    pub async fn run(&self, spec: &ContainerSpec, name: &str) -> Result<String> {
        info!("run name={} image={}", name, spec.image);

        let options = bollard::container::CreateContainerOptions {
            name,
            ..Default::default()
        };

        let config = bollard::container::Config {
            image: Some(spec.image.clone()),
            cmd: spec.cmd.clone(),
            env: if spec.env.is_empty() {
                None
            } else {
                Some(spec.env.clone())
            },
            labels: if spec.labels.is_empty() {
                None
            } else {
                Some(spec.labels.clone())
            },
            exposed_ports: spec.exposed_ports(),
            host_config: Some(spec.host_config()),
            ..Default::default()
        };

        let response = self
            .docker()
            .create_container(Some(options), config)
            .await?;

        debug!("Created container {} ({})", name, response.id);

        self.docker()
            .start_container(
                &response.id,
                None::<bollard::container::StartContainerOptions<String>>,
            )
            .await?;

        info!("Started container {} ({})", name, response.id);
        Ok(response.id)
    }

    /// Stop a container.
    ///
    /// # Errors
    ///
    /// Returns an error if the stop call fails.
    pub async fn stop(&self, name: &str) -> Result<()> {
        info!("stop {}", name);

        self.docker()
            .stop_container(
                name,
                Some(bollard::container::StopContainerOptions {
                    t: STOP_TIMEOUT_SECS,
                }),
            )
            .await?;
        Ok(())
    }

    /// Remove a container.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails; removing an absent container is not
    /// an error.
    pub async fn remove(&self, name: &str, force: bool) -> Result<()> {
        info!("rm force={} {}", force, name);

        match self
            .docker()
            .remove_container(
                name,
                Some(bollard::container::RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                debug!("Container {} already absent", name);
                Ok(())
            }
            Err(e) => Err(RuntimeError::Api(e)),
        }
    }

    /// Stop then force-remove a container. Stop failures are logged, not
    /// propagated; the removal outcome is what matters.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails.
    pub async fn stop_and_remove(&self, name: &str) -> Result<()> {
        if let Err(e) = self.stop(name).await {
            warn!("Failed to stop container {}: {}", name, e);
        }
        self.remove(name, true).await
    }

    /// List containers carrying the managed label.
    ///
    /// # Errors
    ///
    /// Returns an error if the list call fails.
    pub async fn list_managed(&self, all: bool) -> Result<Vec<ContainerSummary>> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![env::managed_label_filter()]);
        self.list_with_filters(all, filters).await
    }

    /// List containers matching a name exactly.
    ///
    /// The runtime's name filter is a substring match, so results are
    /// post-filtered to the exact name.
    ///
    /// # Errors
    ///
    /// Returns an error if the list call fails.
    pub async fn find_by_name(&self, name: &str, all: bool) -> Result<Vec<ContainerSummary>> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![name.to_string()]);

        let summaries = self.list_with_filters(all, filters).await?;
        Ok(summaries
            .into_iter()
            .filter(|s| s.name == name)
            .collect())
    }

    /// Check whether a container with this exact name is listed as running.
    ///
    /// # Errors
    ///
    /// Returns an error if the list call fails.
    pub async fn is_running(&self, name: &str) -> Result<bool> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![name.to_string()]);
        filters.insert("status".to_string(), vec!["running".to_string()]);

        let summaries = self.list_with_filters(false, filters).await?;
        Ok(summaries.iter().any(|s| s.name == name))
    }

    async fn list_with_filters(
        &self,
        all: bool,
        filters: HashMap<String, Vec<String>>,
    ) -> Result<Vec<ContainerSummary>> {
        debug!("ps all={} filters={:?}", all, filters);

        let containers = self
            .docker()
            .list_containers(Some(bollard::container::ListContainersOptions {
                all,
                filters,
                ..Default::default()
            }))
            .await?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id.unwrap_or_default(),
                name: c
                    .names
                    .unwrap_or_default()
                    .first()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default(),
                image: c.image.unwrap_or_default(),
                state: c.state.map(|s| s.to_string()).unwrap_or_default(),
                status: c.status.unwrap_or_default(),
            })
            .collect())
    }
}
