//! Sandbox module - Container-backed code execution
//!
//! - `runtime`: the container runtime verbs, with a Docker implementation
//! - `provision`: the provisioning template and container naming
//! - `registry` / `lifecycle`: live containers, expiry and reuse
//! - `executor`: staging and running code inside a container
//! - `normalize`: decoding raw output before it leaves the service

mod docker;
mod executor;
mod lifecycle;
mod normalize;
mod provision;
mod registry;
mod runtime;
mod service;

#[cfg(test)]
mod testing;

pub use docker::DockerRuntime;
pub use executor::{
    shell_quote, write_command, CodeExecutor, ExecutionEngine, ExecutionRequest, ExecutionResult,
    NO_CODE_PROVIDED,
};
pub use lifecycle::LifecycleManager;
pub use normalize::{decode_lossy, normalize, RawValue};
pub use provision::{
    build_template, container_name, load_init_commands, parse_memory_limit, ProvisioningTemplate,
};
pub use registry::{ContainerRecord, ContainerRegistry};
pub use runtime::{shell, ContainerRuntime, ContainerSummary, ExecOutput};
pub use service::SandboxService;
