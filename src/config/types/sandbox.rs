//! Sandbox configuration types
//!
//! Configuration for the container runtime connection, the provisioning
//! template and the container lifecycle.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Container runtime endpoint (`tcp://host:port`, `unix:///path`).
    /// Falls back to the local Docker defaults when unset.
    #[serde(default)]
    pub docker_host: Option<String>,
    /// Provisioning template settings
    #[serde(default)]
    pub container: ContainerConfig,
    /// Time-to-live of a sandbox container
    #[serde(default = "default_container_timeout", with = "humantime_serde")]
    pub container_timeout: Duration,
    /// Wall-clock bound on staging plus execution of one request
    #[serde(default = "default_execution_timeout", with = "humantime_serde")]
    pub execution_timeout: Duration,
    /// Interval of the background eviction sweep (disabled when unset)
    #[serde(default, with = "humantime_serde")]
    pub sweep_interval: Option<Duration>,
    /// Whether containers are shared between requests
    #[serde(default)]
    pub reuse: ReusePolicy,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            docker_host: None,
            container: ContainerConfig::default(),
            container_timeout: default_container_timeout(),
            execution_timeout: default_execution_timeout(),
            sweep_interval: None,
            reuse: ReusePolicy::default(),
        }
    }
}

fn default_container_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_execution_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Container reuse policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReusePolicy {
    /// One warm container serves every request until it expires
    #[default]
    Shared,
    /// The container is discarded after a single execution
    OneShot,
}

impl std::str::FromStr for ReusePolicy {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "shared" | "reuse" => Ok(ReusePolicy::Shared),
            "one-shot" | "oneshot" | "one_shot" => Ok(ReusePolicy::OneShot),
            _ => Err(crate::error::Error::Config(format!(
                "Invalid reuse policy: {}. Valid: shared, one-shot",
                s
            ))),
        }
    }
}

impl std::fmt::Display for ReusePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReusePolicy::Shared => write!(f, "shared"),
            ReusePolicy::OneShot => write!(f, "one-shot"),
        }
    }
}

/// When the base image is pulled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullPolicy {
    /// Pull on every provisioning
    #[default]
    Always,
    /// Pull only if the image is not present locally
    IfNotPresent,
}

/// Container (Docker) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Docker image to use
    #[serde(default = "default_image")]
    pub image: String,
    /// Prefix of generated container names
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    /// Init-script resource, one shell command per line
    #[serde(default = "default_init_script")]
    pub init_script: PathBuf,
    /// Long-running command that keeps the container alive
    #[serde(default = "default_command")]
    pub command: String,
    /// Network mode
    #[serde(default = "default_network")]
    pub network: String,
    /// Memory limit
    #[serde(default = "default_memory")]
    pub memory_limit: String,
    /// CFS scheduler period in microseconds
    #[serde(default = "default_cpu_period")]
    pub cpu_period: i64,
    /// CFS quota in microseconds per period
    #[serde(default = "default_cpu_quota")]
    pub cpu_quota: i64,
    /// Image pull policy
    #[serde(default)]
    pub pull_policy: PullPolicy,
    /// Interpreter used to run staged code
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    /// Directory inside the container where code is staged
    #[serde(default = "default_workdir")]
    pub workdir: String,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        ContainerConfig {
            image: default_image(),
            name_prefix: default_name_prefix(),
            init_script: default_init_script(),
            command: default_command(),
            network: default_network(),
            memory_limit: default_memory(),
            cpu_period: default_cpu_period(),
            cpu_quota: default_cpu_quota(),
            pull_policy: PullPolicy::default(),
            interpreter: default_interpreter(),
            workdir: default_workdir(),
        }
    }
}

fn default_image() -> String {
    "ubuntu:latest".to_string()
}

fn default_name_prefix() -> String {
    "python-container".to_string()
}

fn default_init_script() -> PathBuf {
    PathBuf::from("./code_exec_container_init.sh")
}

fn default_command() -> String {
    "/bin/bash".to_string()
}

fn default_network() -> String {
    "none".to_string()
}

fn default_memory() -> String {
    "256m".to_string()
}

fn default_cpu_period() -> i64 {
    100_000
}

fn default_cpu_quota() -> i64 {
    50_000
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_workdir() -> String {
    "/tmp".to_string()
}
