//! Container runtime adapter
//!
//! The verbs the lifecycle manager and execution engine need from a
//! container runtime daemon. [`DockerRuntime`](super::DockerRuntime) is the
//! production implementation.

use async_trait::async_trait;

use crate::error::Result;
use crate::sandbox::provision::ProvisioningTemplate;

/// Output of a command run inside a container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit code, if the process ran to completion
    pub exit_code: Option<i64>,
    /// Combined stdout and stderr, in arrival order
    pub output: Vec<u8>,
}

impl ExecOutput {
    /// Whether the command exited with status zero
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A container as reported by the runtime's list verb
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
}

/// Container runtime verbs
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Get the runtime name
    fn name(&self) -> &str;

    /// Check that the daemon is reachable
    async fn ping(&self) -> Result<()>;

    /// Check whether an image is present locally
    async fn image_exists(&self, image: &str) -> Result<bool>;

    /// Pull an image. Pulling an image that is already present is a no-op.
    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Create a container from the template, returning its id
    async fn create_container(&self, name: &str, template: &ProvisioningTemplate) -> Result<String>;

    /// Start a created container
    async fn start_container(&self, id: &str) -> Result<()>;

    /// Run a command inside a running container and wait for it to finish
    async fn exec(&self, id: &str, cmd: Vec<String>) -> Result<ExecOutput>;

    /// Stop a running container
    async fn stop_container(&self, id: &str) -> Result<()>;

    /// Remove a container
    async fn remove_container(&self, id: &str) -> Result<()>;

    /// List containers (running or not) whose name starts with `name_prefix`
    async fn list_containers(&self, name_prefix: &str) -> Result<Vec<ContainerSummary>>;
}

/// Wrap a shell command line for [`ContainerRuntime::exec`]
pub fn shell(script: impl Into<String>) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.into()]
}
