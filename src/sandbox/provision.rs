//! Provisioning policy
//!
//! Turns the container configuration into the template a new sandbox is
//! created from, including the init commands read from the init script.

use chrono::{DateTime, Local};
use std::path::Path;

use crate::config::{ContainerConfig, PullPolicy};
use crate::error::{Error, Result};

/// Comment marker of the init script
const COMMENT_MARKER: char = '#';

/// Everything needed to create and initialize one sandbox container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningTemplate {
    /// Image to instantiate
    pub image: String,
    /// Prefix of the generated container name
    pub name_prefix: String,
    /// Long-running command keeping the container alive
    pub command: String,
    /// Memory ceiling in bytes
    pub memory_bytes: i64,
    /// CFS period in microseconds
    pub cpu_period: i64,
    /// CFS quota in microseconds per period
    pub cpu_quota: i64,
    /// Network mode; `none` disables networking entirely
    pub network_mode: String,
    /// When to pull the image
    pub pull_policy: PullPolicy,
    /// Commands run once, in order, after the container starts
    pub init_commands: Vec<String>,
}

impl ProvisioningTemplate {
    /// Whether networking is disabled for the container
    pub fn network_disabled(&self) -> bool {
        self.network_mode == "none"
    }
}

/// Build the provisioning template from configuration.
///
/// Fails with a configuration error if the init script is missing or the
/// memory limit cannot be parsed.
pub fn build_template(config: &ContainerConfig) -> Result<ProvisioningTemplate> {
    let memory_bytes = parse_memory_limit(&config.memory_limit).ok_or_else(|| {
        Error::Config(format!("Invalid memory limit: {}", config.memory_limit))
    })?;

    let init_commands = load_init_commands(&config.init_script)?;

    Ok(ProvisioningTemplate {
        image: config.image.clone(),
        name_prefix: config.name_prefix.clone(),
        command: config.command.clone(),
        memory_bytes,
        cpu_period: config.cpu_period,
        cpu_quota: config.cpu_quota,
        network_mode: config.network.clone(),
        pull_policy: config.pull_policy,
        init_commands,
    })
}

/// Read the init script: one command per line, trimmed, with blank lines and
/// `#` comments dropped.
pub fn load_init_commands(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Init script {} does not exist",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read init script {}: {}", path.display(), e))
    })?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(COMMENT_MARKER))
        .map(str::to_string)
        .collect())
}

/// Generate a container name: `<prefix>-<YYYYmmddHHMMSS>-<epoch seconds>`
pub fn container_name(prefix: &str, now: DateTime<Local>) -> String {
    format!(
        "{}-{}-{}",
        prefix,
        now.format("%Y%m%d%H%M%S"),
        now.timestamp()
    )
}

/// Parse a memory limit string (e.g., "512m", "1g") to bytes
pub fn parse_memory_limit(limit: &str) -> Option<i64> {
    let limit = limit.trim().to_lowercase();
    let (num_str, unit) = if limit.ends_with('g') || limit.ends_with("gb") {
        (limit.trim_end_matches(['g', 'b']), "g")
    } else if limit.ends_with('m') || limit.ends_with("mb") {
        (limit.trim_end_matches(['m', 'b']), "m")
    } else if limit.ends_with('k') || limit.ends_with("kb") {
        (limit.trim_end_matches(['k', 'b']), "k")
    } else {
        (limit.trim_end_matches('b'), "b")
    };

    let num: i64 = num_str.parse().ok()?;
    if num <= 0 {
        return None;
    }

    match unit {
        "g" => num.checked_mul(1024 * 1024 * 1024),
        "m" => num.checked_mul(1024 * 1024),
        "k" => num.checked_mul(1024),
        _ => Some(num),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    #[test]
    fn test_parse_memory_limit() {
        assert_eq!(parse_memory_limit("256m"), Some(256 * 1024 * 1024));
        assert_eq!(parse_memory_limit("512MB"), Some(512 * 1024 * 1024));
        assert_eq!(parse_memory_limit("1g"), Some(1024 * 1024 * 1024));
        assert_eq!(parse_memory_limit("1024k"), Some(1024 * 1024));
        assert_eq!(parse_memory_limit("1024"), Some(1024));
        assert_eq!(parse_memory_limit("lots"), None);
        assert_eq!(parse_memory_limit("0m"), None);
    }

    #[test]
    fn test_load_init_commands_filters_comments_and_blanks() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# install python").unwrap();
        writeln!(file, "apt-get update").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "   ").unwrap();
        writeln!(file, "  apt-get install -y python3  ").unwrap();
        writeln!(file, "   # indented comment").unwrap();

        let commands = load_init_commands(file.path()).unwrap();
        assert_eq!(commands, vec!["apt-get update", "apt-get install -y python3"]);
    }

    #[test]
    fn test_load_init_commands_missing_file() {
        let err = load_init_commands(Path::new("/no/such/init.sh")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("/no/such/init.sh"));
    }

    #[test]
    fn test_build_template() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "true").unwrap();

        let config = ContainerConfig {
            init_script: file.path().to_path_buf(),
            ..Default::default()
        };
        let template = build_template(&config).unwrap();

        assert_eq!(template.image, "ubuntu:latest");
        assert_eq!(template.memory_bytes, 256 * 1024 * 1024);
        assert_eq!(template.cpu_period, 100_000);
        assert_eq!(template.cpu_quota, 50_000);
        assert!(template.network_disabled());
        assert_eq!(template.init_commands, vec!["true"]);
    }

    #[test]
    fn test_build_template_bad_memory_limit() {
        let config = ContainerConfig {
            memory_limit: "huge".to_string(),
            ..Default::default()
        };
        assert!(matches!(build_template(&config), Err(Error::Config(_))));
    }

    #[test]
    fn test_container_name() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let name = container_name("python-container", now);
        assert_eq!(
            name,
            format!("python-container-20240309140507-{}", now.timestamp())
        );
    }
}
