//! Error types for code-exec

use thiserror::Error;

/// Result type alias using code-exec's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for code-exec
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (missing init script, unreachable runtime, bad settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Container runtime (Docker daemon) error
    #[error("Container runtime error: {0}")]
    Runtime(String),

    /// Provisioning failed (image pull, create/start, init command)
    #[error("Provisioning error: {0}")]
    Provisioning(String),

    /// Container is no longer registered
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<bollard::errors::Error> for Error {
    fn from(err: bollard::errors::Error) -> Self {
        Error::Runtime(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotFound("container abc".into());
        assert_eq!(err.to_string(), "Not found: container abc");

        let err = Error::Provisioning("Init command `exit 1` failed (exit code 1)".into());
        assert_eq!(
            err.to_string(),
            "Provisioning error: Init command `exit 1` failed (exit code 1)"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        fn read_missing() -> Result<String> {
            Ok(std::fs::read_to_string("/no/such/code-exec/file")?)
        }
        assert!(matches!(read_missing(), Err(Error::Io(_))));
    }
}
