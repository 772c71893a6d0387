//! Image availability: registry pulls and custom CLI builds.
//!
//! Registry images are pulled through the API. Custom images are built with
//! the Docker/Podman CLI (tar-streaming a build context over the API is not
//! worth the complexity), invoked with an argument vector.

use crate::executor::{ExecutionCommand, HostExecutor};
use crate::runtime::{Result, RuntimeClient, RuntimeError};
use futures::stream::StreamExt;
use std::path::PathBuf;
use tracing::{debug, info};

/// Where an image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// A registry image pulled by name (e.g. `mongo`)
    Registry(String),
    /// A custom image built from a local Docker context
    Build {
        /// Tag for the built image
        tag: String,
        /// Directory containing the Dockerfile
        context: PathBuf,
    },
}

impl ImageSource {
    /// The image tag an instance of this source runs as.
    pub fn tag(&self) -> &str {
        match self {
            ImageSource::Registry(name) => name,
            ImageSource::Build { tag, .. } => tag,
        }
    }
}

/// Ensures images are available locally, pulling or building as needed.
pub struct ImageBuilder {
    client: RuntimeClient,
    executor: HostExecutor,
}

impl ImageBuilder {
    /// Create a new image builder.
    pub fn new(client: RuntimeClient) -> Self {
        Self {
            client,
            executor: HostExecutor::new(),
        }
    }

    /// Ensure an image is available locally, pulling or building if absent.
    ///
    /// Returns the image tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the pull or build fails.
    pub async fn ensure(&self, source: &ImageSource) -> Result<String> {
        if self.client.image_exists(source.tag()).await? {
            debug!("Image {} already exists locally", source.tag());
            return Ok(source.tag().to_string());
        }

        match source {
            ImageSource::Registry(name) => {
                self.pull(name).await?;
                Ok(name.clone())
            }
            ImageSource::Build { tag, context } => {
                self.build(tag, context.clone()).await?;
                Ok(tag.clone())
            }
        }
    }

    /// Pull an image from a registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the pull fails.
    pub async fn pull(&self, image: &str) -> Result<()> {
        info!("Pulling image: {}", image);

        let mut stream = self.client.docker().create_image(
            Some(bollard::image::CreateImageOptions {
                from_image: image,
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(result) = stream.next().await {
            match result {
                Ok(progress) => {
                    if let Some(status) = progress.status {
                        debug!("Pull: {}", status);
                    }
                    if let Some(error) = progress.error {
                        return Err(RuntimeError::Build(format!("pull failed: {}", error)));
                    }
                }
                Err(e) => {
                    return Err(RuntimeError::Api(e));
                }
            }
        }

        info!("Pulled image: {}", image);
        Ok(())
    }

    /// Build a custom image from a local context via the runtime CLI.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Unavailable`] if no runtime CLI is on PATH, and
    /// [`RuntimeError::Build`] with the CLI diagnostics if the build fails.
    pub async fn build(&self, tag: &str, context: PathBuf) -> Result<()> {
        let cli = Self::find_cli()?;
        info!("Building image {} from {:?} via {}", tag, context, cli);

        let cmd = ExecutionCommand::new(
            cli,
            vec![
                "build".to_string(),
                "-t".to_string(),
                tag.to_string(),
                context.to_string_lossy().into_owned(),
            ],
        );

        let result = self
            .executor
            .execute(cmd)
            .await
            .map_err(|e| RuntimeError::Build(format!("failed to run image build: {}", e)))?;

        if !result.success() {
            return Err(RuntimeError::Build(format!(
                "image build for {} exited with code {}: {}",
                tag, result.exit_code, result.stderr
            )));
        }

        info!("Built image: {}", tag);
        Ok(())
    }

    /// Locate the docker or podman CLI on PATH.
    fn find_cli() -> Result<String> {
        for candidate in ["docker", "podman"] {
            if which::which(candidate).is_ok() {
                return Ok(candidate.to_string());
            }
        }
        Err(RuntimeError::Unavailable(
            "neither docker nor podman CLI found on PATH".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_source_tags() {
        let registry = ImageSource::Registry("mongo".to_string());
        assert_eq!(registry.tag(), "mongo");

        let build = ImageSource::Build {
            tag: "custom-spark-image".to_string(),
            context: PathBuf::from("docker/spark"),
        };
        assert_eq!(build.tag(), "custom-spark-image");
    }

    #[tokio::test]
    #[ignore] // Requires Docker/Podman
    async fn ensure_registry_image() {
        let client = RuntimeClient::connect().await.unwrap();
        let builder = ImageBuilder::new(client);
        let tag = builder
            .ensure(&ImageSource::Registry("alpine:latest".to_string()))
            .await
            .unwrap();
        assert_eq!(tag, "alpine:latest");
    }
}
