//! Container specification builder.
//!
//! Fluent construction of the name/image/env/ports/labels/volume bundle a
//! managed instance is created from. Everything ends up as structured API
//! fields; nothing is ever interpolated into a shell string.

use crate::runtime::{Result, RuntimeError};
use bollard::service::{HostConfig, PortBinding};
use std::collections::HashMap;

/// Container specification builder.
pub struct ContainerSpecBuilder {
    image: Option<String>,
    cmd: Option<Vec<String>>,
    env: Vec<String>,
    labels: HashMap<String, String>,
    binds: Vec<String>,
    port_bindings: HashMap<String, Option<Vec<PortBinding>>>,
}

impl Default for ContainerSpecBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerSpecBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            image: None,
            cmd: None,
            env: Vec::new(),
            labels: HashMap::new(),
            binds: Vec::new(),
            port_bindings: HashMap::new(),
        }
    }

    /// Set the container image.
    pub fn image<S: Into<String>>(mut self, image: S) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Set the command to run in the container.
    pub fn cmd<I, S>(mut self, cmd: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmd = Some(cmd.into_iter().map(|s| s.into()).collect());
        self
    }

    /// Add an environment variable.
    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.push(format!("{}={}", key.into(), value.into()));
        self
    }

    /// Add a label.
    pub fn label<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add a volume bind mount (host_path:container_path[:mode]).
    pub fn bind<S: Into<String>>(mut self, bind: S) -> Self {
        self.binds.push(bind.into());
        self
    }

    /// Publish a container TCP port on a host port.
    pub fn port_binding(mut self, container_port: u16, host_port: u16) -> Self {
        self.port_bindings.insert(
            format!("{}/tcp", container_port),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(host_port.to_string()),
            }]),
        );
        self
    }

    /// Build the container specification.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Spec`] if the image is missing.
    pub fn build(self) -> Result<ContainerSpec> {
        let image = self
            .image
            .ok_or_else(|| RuntimeError::Spec("image is required".to_string()))?;

        Ok(ContainerSpec {
            image,
            cmd: self.cmd,
            env: self.env,
            labels: self.labels,
            binds: self.binds,
            port_bindings: self.port_bindings,
        })
    }
}

/// Container specification.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    /// Image name
    pub image: String,
    /// Command to run
    pub cmd: Option<Vec<String>>,
    /// Environment variables as KEY=VALUE entries
    pub env: Vec<String>,
    /// Labels
    pub labels: HashMap<String, String>,
    /// Volume bind mounts
    pub binds: Vec<String>,
    /// Port bindings (container port/proto -> host bindings)
    pub port_bindings: HashMap<String, Option<Vec<PortBinding>>>,
}

impl ContainerSpec {
    /// Create a new specification builder.
    pub fn builder() -> ContainerSpecBuilder {
        ContainerSpecBuilder::new()
    }

    /// Host configuration for the create call.
    pub(crate) fn host_config(&self) -> HostConfig {
        HostConfig {
            binds: if self.binds.is_empty() {
                None
            } else {
                Some(self.binds.clone())
            },
            port_bindings: if self.port_bindings.is_empty() {
                None
            } else {
                Some(self.port_bindings.clone())
            },
            ..Default::default()
        }
    }

    /// Exposed ports for the create call, derived from the bindings.
    pub(crate) fn exposed_ports(&self) -> Option<HashMap<String, HashMap<(), ()>>> {
        if self.port_bindings.is_empty() {
            return None;
        }
        Some(
            self.port_bindings
                .keys()
                .map(|port| (port.clone(), HashMap::new()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_spec() {
        let spec = ContainerSpec::builder()
            .image("mongo")
            .env("MONGO_INITDB_ROOT_USERNAME", "admin")
            .label("toolforge.managed", "true")
            .build()
            .unwrap();

        assert_eq!(spec.image, "mongo");
        assert!(spec.env.contains(&"MONGO_INITDB_ROOT_USERNAME=admin".to_string()));
        assert_eq!(
            spec.labels.get("toolforge.managed"),
            Some(&"true".to_string())
        );
    }

    #[test]
    fn port_bindings() {
        let spec = ContainerSpec::builder()
            .image("mongo")
            .port_binding(27017, 27018)
            .build()
            .unwrap();

        let bindings = spec.port_bindings.get("27017/tcp").unwrap().as_ref().unwrap();
        assert_eq!(bindings[0].host_port.as_deref(), Some("27018"));

        let exposed = spec.exposed_ports().unwrap();
        assert!(exposed.contains_key("27017/tcp"));
    }

    #[test]
    fn volume_binds() {
        let spec = ContainerSpec::builder()
            .image("mongo")
            .bind("/srv/data/m1:/data/db")
            .build()
            .unwrap();

        let host_config = spec.host_config();
        assert_eq!(host_config.binds.unwrap(), vec!["/srv/data/m1:/data/db"]);
    }

    #[test]
    fn missing_image_is_an_error() {
        let result = ContainerSpec::builder().env("A", "b").build();
        assert!(matches!(result, Err(RuntimeError::Spec(_))));
    }
}
