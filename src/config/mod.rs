//! Configuration module
//!
//! - types/mod.rs: Core configuration types (Config, ServerConfig)
//! - types/sandbox.rs: Runtime, provisioning and lifecycle configuration
//! - io.rs: Configuration file location, loading and saving
//! - validation.rs: Configuration validation

mod io;
mod types;
mod validation;

// Re-export core config types
pub use types::{Config, ServerConfig};

// Re-export sandbox types
pub use types::sandbox::{ContainerConfig, PullPolicy, ReusePolicy, SandboxConfig};

// Re-export IO and utilities
pub use io::{
    apply_env_overrides, config_dir, config_path, load_config, load_config_from_path, save_config,
};
pub use validation::{validate_config, ConfigValidationResult, ValidationIssue};
