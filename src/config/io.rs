//! Configuration I/O - Loading and saving configuration
//!
//! Handles locating, reading and writing the config file, and overlaying
//! environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::types::Config;
use crate::error::{Error, Result};

/// Config file name inside the config directory
const CONFIG_FILE: &str = "config.json";

/// Directory holding the config file: `CODE_EXEC_CONFIG_DIR`, else
/// `code-exec` under the platform config directory
pub fn config_dir() -> PathBuf {
    resolve_config_dir(&|key: &str| std::env::var(key).ok(), dirs::config_dir())
}

/// The config file: `CODE_EXEC_CONFIG`, else `config.json` in [`config_dir`]
pub fn config_path() -> PathBuf {
    non_empty(std::env::var("CODE_EXEC_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| config_dir().join(CONFIG_FILE))
}

fn resolve_config_dir<F>(lookup: &F, platform_dir: Option<PathBuf>) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup("CODE_EXEC_CONFIG_DIR")) {
        Some(dir) => PathBuf::from(dir),
        None => platform_dir.unwrap_or_default().join(crate::NAME),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Load configuration with layered precedence:
/// 1. Config file (config.json / config.toml) if it exists, otherwise defaults
/// 2. Environment variable overrides (includes .env)
pub fn load_config() -> Result<Config> {
    let config_path = config_path();

    let mut config = if config_path.exists() {
        load_config_from_path(&config_path)?
    } else {
        Config::default()
    };

    // Apply environment variable overrides (highest precedence)
    apply_env_overrides(&mut config);

    Ok(config)
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    // Detect format by extension
    let config: Config = if path.extension().is_some_and(|ext| ext == "json") {
        // Parse as JSON5 (more lenient than strict JSON)
        json5::from_str(&content).map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))?
    } else if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))?
    } else {
        // Try JSON5 first, then TOML
        json5::from_str(&content)
            .or_else(|_| toml::from_str(&content).map_err(|e| Error::Config(e.to_string())))
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?
    };

    Ok(config)
}

/// Apply environment variable overrides to an existing config.
///
/// Loads the `.env` file if present, then overlays any set variable.
/// Env vars have the highest precedence: defaults < file < env.
pub fn apply_env_overrides(config: &mut Config) {
    dotenvy::dotenv().ok();
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

/// Apply overrides read through `lookup`. Unparsable numeric values are ignored.
pub(crate) fn apply_overrides_from<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let sandbox = &mut config.sandbox;

    if let Some(image) = lookup("CODE_EXEC_DOCKER_IMAGE") {
        sandbox.container.image = image;
    }
    if let Some(prefix) = lookup("CODE_EXEC_CONTAINER_PREFIX") {
        sandbox.container.name_prefix = prefix;
    }
    if let Some(path) = lookup("CODE_EXEC_INSTALL_CMD_FILE") {
        sandbox.container.init_script = PathBuf::from(path);
    }
    if let Some(host) = lookup("CODE_EXEC_DOCKER_HOST") {
        sandbox.docker_host = Some(host).filter(|h| !h.is_empty());
    }
    if let Some(secs) = lookup("CODE_EXEC_CONTAINER_TIMEOUT") {
        if let Ok(v) = secs.parse() {
            sandbox.container_timeout = Duration::from_secs(v);
        }
    }
    if let Some(secs) = lookup("CODE_EXEC_EXECUTION_TIMEOUT") {
        if let Ok(v) = secs.parse() {
            sandbox.execution_timeout = Duration::from_secs(v);
        }
    }
    if let Some(policy) = lookup("CODE_EXEC_REUSE_POLICY") {
        if let Ok(v) = policy.parse() {
            sandbox.reuse = v;
        }
    }

    // Server overrides
    if let Some(bind) = lookup("CODE_EXEC_BIND") {
        config.server.bind = bind;
    }
    if let Some(port) = lookup("CODE_EXEC_PORT") {
        if let Ok(port) = port.parse() {
            config.server.port = port;
        }
    }
}

/// Save configuration to a file
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    let content = if path.extension().is_some_and(|ext| ext == "toml") {
        toml::to_string_pretty(config).map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    } else {
        serde_json::to_string_pretty(config)?
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, content)?;
    Ok(())
}
