//! Docker runtime
//!
//! [`ContainerRuntime`] over the Docker Engine API, via bollard.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogOutput, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::StreamExt;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::sandbox::provision::ProvisioningTemplate;
use crate::sandbox::runtime::{ContainerRuntime, ContainerSummary, ExecOutput};

/// Request timeout for the daemon connection, in seconds
const CONNECT_TIMEOUT_SECS: u64 = 120;

/// Grace period before a stopped container is killed, in seconds
const STOP_TIMEOUT_SECS: i64 = 5;

/// Docker container runtime
pub struct DockerRuntime {
    /// Docker client
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the Docker daemon and verify the connection.
    ///
    /// `host` accepts `tcp://`, `http://` and `unix://` endpoints; `None`
    /// uses the local defaults (including `DOCKER_HOST`).
    pub async fn connect(host: Option<&str>) -> Result<Self> {
        let docker = match host {
            None => Docker::connect_with_local_defaults(),
            Some(host) => {
                let url = url::Url::parse(host)
                    .map_err(|e| Error::Config(format!("Invalid Docker host {}: {}", host, e)))?;
                match url.scheme() {
                    "tcp" | "http" => {
                        Docker::connect_with_http(host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
                    }
                    "unix" => {
                        Docker::connect_with_socket(host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)
                    }
                    other => {
                        return Err(Error::Config(format!(
                            "Unsupported Docker host scheme: {}",
                            other
                        )))
                    }
                }
            }
        }
        .map_err(|e| Error::Config(format!("Failed to connect to Docker: {}", e)))?;

        let runtime = DockerRuntime { docker };
        runtime
            .ping()
            .await
            .map_err(|e| Error::Config(format!("Docker ping failed: {}", e)))?;

        info!(host = host.unwrap_or("local defaults"), "Connected to Docker");

        Ok(runtime)
    }
}

/// Whether a local image tag refers to `image` (an untagged name means `:latest`)
fn tag_matches(tag: &str, image: &str) -> bool {
    if tag == image {
        return true;
    }
    let last_segment = image.rsplit('/').next().unwrap_or(image);
    !last_segment.contains(':') && tag == format!("{}:latest", image)
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &str {
        "docker"
    }

    async fn ping(&self) -> Result<()> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool> {
        let images = self
            .docker
            .list_images::<String>(None)
            .await
            .map_err(|e| Error::Runtime(format!("Failed to list images: {}", e)))?;

        Ok(images
            .iter()
            .any(|img| img.repo_tags.iter().any(|tag| tag_matches(tag, image))))
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        info!("Pulling Docker image: {}", image);

        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!("Pull status: {}", status);
                    }
                }
                Err(e) => {
                    return Err(Error::Provisioning(format!(
                        "Failed to pull image {}: {}",
                        image, e
                    )));
                }
            }
        }

        info!("Image {} pulled successfully", image);
        Ok(())
    }

    async fn create_container(&self, name: &str, template: &ProvisioningTemplate) -> Result<String> {
        let container_config = Config {
            image: Some(template.image.clone()),
            cmd: Some(vec![template.command.clone()]),
            // A TTY keeps the shell alive between execs
            tty: Some(true),
            network_disabled: Some(template.network_disabled()),
            host_config: Some(HostConfig {
                memory: Some(template.memory_bytes),
                cpu_period: Some(template.cpu_period),
                cpu_quota: Some(template.cpu_quota),
                network_mode: Some(template.network_mode.clone()),
                auto_remove: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };

        let create_options = CreateContainerOptions {
            name,
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(create_options), container_config)
            .await
            .map_err(|e| Error::Provisioning(format!("Failed to create container {}: {}", name, e)))?;

        debug!(container_id = %response.id, "Created container {}", name);
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| Error::Provisioning(format!("Failed to start container: {}", e)))?;
        Ok(())
    }

    async fn exec(&self, id: &str, cmd: Vec<String>) -> Result<ExecOutput> {
        let options = CreateExecOptions {
            cmd: Some(cmd),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(id, options)
            .await
            .map_err(|e| Error::Runtime(format!("Failed to create exec: {}", e)))?;

        let mut output = Vec::new();

        match self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| Error::Runtime(format!("Failed to start exec: {}", e)))?
        {
            StartExecResults::Attached {
                output: mut stream, ..
            } => {
                while let Some(result) = stream.next().await {
                    match result {
                        Ok(LogOutput::StdOut { message })
                        | Ok(LogOutput::StdErr { message })
                        | Ok(LogOutput::Console { message }) => {
                            output.extend_from_slice(&message);
                        }
                        Ok(LogOutput::StdIn { .. }) => {}
                        Err(e) => {
                            return Err(Error::Runtime(format!(
                                "Failed to read exec output: {}",
                                e
                            )));
                        }
                    }
                }
            }
            StartExecResults::Detached => {}
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| Error::Runtime(format!("Failed to inspect exec: {}", e)))?;

        Ok(ExecOutput {
            exit_code: inspect.exit_code,
            output,
        })
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: STOP_TIMEOUT_SECS }))
            .await
            .map_err(|e| Error::Runtime(format!("Failed to stop container: {}", e)))?;
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| Error::Runtime(format!("Failed to remove container: {}", e)))?;

        debug!(container_id = %id, "Removed container");
        Ok(())
    }

    async fn list_containers(&self, name_prefix: &str) -> Result<Vec<ContainerSummary>> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![name_prefix.to_string()]);

        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| Error::Runtime(format!("Failed to list containers: {}", e)))?;

        // The daemon's name filter is a substring match
        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let name = c
                    .names?
                    .into_iter()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .find(|n| n.starts_with(name_prefix))?;
                Some(ContainerSummary { id, name })
            })
            .collect())
    }
}
