//! Configuration validation
//!
//! Validates configuration and reports issues.

use super::types::Config;
use crate::sandbox::parse_memory_limit;

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    result = validate_runtime_config(config, result);
    result = validate_container_config(config, result);
    result = validate_lifecycle_config(config, result);

    result
}

fn validate_runtime_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    let Some(ref host) = config.sandbox.docker_host else {
        return result;
    };

    match url::Url::parse(host) {
        Ok(url) if matches!(url.scheme(), "tcp" | "http" | "unix") => {}
        Ok(url) => {
            result = result.with_error(
                ValidationIssue::new(
                    "sandbox.docker_host",
                    format!("Unsupported runtime endpoint scheme: {}", url.scheme()),
                )
                .with_suggestion("Use tcp://host:port, http://host:port or unix:///path/to/docker.sock"),
            );
        }
        Err(e) => {
            result = result.with_error(
                ValidationIssue::new(
                    "sandbox.docker_host",
                    format!("Invalid runtime endpoint {}: {}", host, e),
                )
                .with_suggestion("Unset CODE_EXEC_DOCKER_HOST to use the local Docker defaults"),
            );
        }
    }

    result
}

fn validate_container_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    let container = &config.sandbox.container;

    if container.image.is_empty() {
        result = result.with_error(
            ValidationIssue::new("sandbox.container.image", "No base image specified")
                .with_suggestion("Set CODE_EXEC_DOCKER_IMAGE or sandbox.container.image"),
        );
    }

    if container.name_prefix.is_empty() {
        result = result.with_error(
            ValidationIssue::new(
                "sandbox.container.name_prefix",
                "Container name prefix must not be empty",
            )
            .with_suggestion("Set CODE_EXEC_CONTAINER_PREFIX"),
        );
    }

    if parse_memory_limit(&container.memory_limit).is_none() {
        result = result.with_error(
            ValidationIssue::new(
                "sandbox.container.memory_limit",
                format!("Unparsable memory limit: {}", container.memory_limit),
            )
            .with_suggestion("Use a size such as 256m, 1g or 524288k"),
        );
    }

    if container.cpu_period <= 0 {
        result = result.with_error(ValidationIssue::new(
            "sandbox.container.cpu_period",
            "CPU period must be positive",
        ));
    } else if container.cpu_quota > container.cpu_period {
        result = result.with_warning(ValidationIssue::new(
            "sandbox.container.cpu_quota",
            "CPU quota exceeds the period; the sandbox may use more than one CPU",
        ));
    }

    if container.network != "none" {
        result = result.with_warning(
            ValidationIssue::new(
                "sandbox.container.network",
                format!("Sandbox containers will have network access ({})", container.network),
            )
            .with_suggestion("Set sandbox.container.network to \"none\""),
        );
    }

    if !container.init_script.exists() {
        result = result.with_warning(
            ValidationIssue::new(
                "sandbox.container.init_script",
                format!(
                    "Init script does not exist: {}; provisioning will fail",
                    container.init_script.display()
                ),
            )
            .with_suggestion("Set CODE_EXEC_INSTALL_CMD_FILE to an existing file"),
        );
    }

    result
}

fn validate_lifecycle_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.sandbox.execution_timeout.is_zero() {
        result = result.with_error(ValidationIssue::new(
            "sandbox.execution_timeout",
            "Execution timeout must be greater than zero",
        ));
    }

    if config.sandbox.sweep_interval.is_some_and(|interval| interval.is_zero()) {
        result = result.with_error(
            ValidationIssue::new("sandbox.sweep_interval", "Sweep interval must be greater than zero")
                .with_suggestion("Remove sweep_interval to disable the background sweep"),
        );
    }

    if config.sandbox.execution_timeout >= config.sandbox.container_timeout {
        result = result.with_warning(ValidationIssue::new(
            "sandbox.container_timeout",
            "Container timeout does not exceed the execution timeout",
        ));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_validate_default_config() {
        let config = Config::default();
        let result = validate_config(&config);

        // The default init script may be absent; that is only a warning
        assert!(result.errors.is_empty());
        assert!(result.valid);
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = Config::default();
        config.sandbox.container.image = String::new();
        config.sandbox.container.memory_limit = "lots".to_string();
        config.sandbox.docker_host = Some("ftp://localhost".to_string());
        config.sandbox.execution_timeout = Duration::ZERO;
        config.sandbox.sweep_interval = Some(Duration::ZERO);

        let result = validate_config(&config);
        assert!(!result.valid);

        let paths: Vec<&str> = result.errors.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"sandbox.container.image"));
        assert!(paths.contains(&"sandbox.container.memory_limit"));
        assert!(paths.contains(&"sandbox.docker_host"));
        assert!(paths.contains(&"sandbox.execution_timeout"));
        assert!(paths.contains(&"sandbox.sweep_interval"));
    }

    #[test]
    fn test_validate_warns_on_network_and_quota() {
        let mut config = Config::default();
        config.sandbox.container.network = "bridge".to_string();
        config.sandbox.container.cpu_quota = 200_000;

        let result = validate_config(&config);
        let paths: Vec<&str> = result.warnings.iter().map(|w| w.path.as_str()).collect();
        assert!(paths.contains(&"sandbox.container.network"));
        assert!(paths.contains(&"sandbox.container.cpu_quota"));
    }
}
