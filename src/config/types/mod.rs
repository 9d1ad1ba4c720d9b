//! Configuration types module

pub mod sandbox;

use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Sandbox configuration
    #[serde(default)]
    pub sandbox: sandbox::SandboxConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

fn default_port() -> u16 {
    5000
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}
