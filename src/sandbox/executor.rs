//! Execution engine and the common executor trait
//!
//! Stages source text inside a sandbox container and runs it with the
//! interpreter. The protocol is strictly ordered: touch the destination
//! file, write the code through a single-quoted shell redirect, run it.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::SandboxConfig;
use crate::error::{Error, Result};
use crate::sandbox::lifecycle::LifecycleManager;
use crate::sandbox::normalize::RawValue;
use crate::sandbox::runtime::{shell, ContainerRuntime, ExecOutput};

/// Output returned when a request carries no code
pub const NO_CODE_PROVIDED: &str = "No code provided";

/// Request to execute code
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// The code to execute; a missing or null field reads as empty
    #[serde(default, deserialize_with = "null_as_empty")]
    pub code: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl ExecutionRequest {
    /// Create a new execution request
    pub fn new(code: impl Into<String>) -> Self {
        ExecutionRequest { code: code.into() }
    }
}

/// Result of code execution, before normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Whether execution was successful
    pub success: bool,
    /// Combined output, as produced by the runtime
    pub output: Vec<u8>,
    /// Exit code, present only when the process ran to completion
    pub exit_code: Option<i64>,
}

impl ExecutionResult {
    /// A failure carrying a message and no exit code
    pub fn failure(message: impl Into<String>) -> Self {
        ExecutionResult {
            success: false,
            output: message.into().into_bytes(),
            exit_code: None,
        }
    }

    /// Failure for an error that escaped the execution protocol
    pub fn server_error(error: impl std::fmt::Display) -> Self {
        Self::failure(format!("Server error: {}", error))
    }

    /// The execution was abandoned after `timeout`
    pub fn timeout(timeout: Duration) -> Self {
        Self::failure(format!(
            "Execution timed out after {}s",
            timeout.as_secs_f64()
        ))
    }

    /// Output as text, dropping undecodable bytes
    pub fn output_text(&self) -> String {
        crate::sandbox::normalize::decode_lossy(&self.output)
    }

    /// Normalized JSON body: `{ success, output, exit_code? }`
    pub fn into_json(self) -> serde_json::Value {
        RawValue::from(self).normalize().into_json()
    }
}

impl From<ExecOutput> for ExecutionResult {
    fn from(out: ExecOutput) -> Self {
        ExecutionResult {
            success: out.succeeded(),
            output: out.output,
            exit_code: out.exit_code,
        }
    }
}

impl From<ExecutionResult> for RawValue {
    fn from(result: ExecutionResult) -> Self {
        let mut map = BTreeMap::new();
        map.insert("success".to_string(), RawValue::Bool(result.success));
        map.insert("output".to_string(), RawValue::Bytes(result.output));
        if let Some(code) = result.exit_code {
            map.insert("exit_code".to_string(), RawValue::Int(code));
        }
        RawValue::Map(map)
    }
}

/// Trait for code execution backends
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Get the executor name
    fn name(&self) -> &str;

    /// Execute code. Errors are faults outside the execution protocol
    /// (provisioning, raced eviction); protocol failures come back as
    /// unsuccessful results.
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult>;

    /// Number of live sandbox containers
    async fn container_count(&self) -> usize;
}

/// Quote text as one single-quoted shell word: `'` becomes `'\''`
pub fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

/// Shell line writing `code` verbatim into `path`
pub fn write_command(path: &str, code: &str) -> String {
    format!("printf '%s' {} > {}", shell_quote(code), path)
}

/// A fresh staging path under `workdir`
fn staging_path(workdir: &str) -> String {
    format!(
        "{}/code-{}.py",
        workdir.trim_end_matches('/'),
        uuid::Uuid::new_v4().simple()
    )
}

/// Runs code inside registered sandbox containers
pub struct ExecutionEngine {
    manager: Arc<LifecycleManager>,
    /// Interpreter used to run the staged file
    interpreter: String,
    /// Directory for staged files
    workdir: String,
    /// Bound on staging plus execution, and separately on cleanup
    timeout: Duration,
}

impl ExecutionEngine {
    pub fn new(manager: Arc<LifecycleManager>, config: &SandboxConfig) -> Self {
        ExecutionEngine {
            manager,
            interpreter: config.container.interpreter.clone(),
            workdir: config.container.workdir.clone(),
            timeout: config.execution_timeout,
        }
    }

    /// Stage and run `code` in the container.
    ///
    /// Fails with [`Error::NotFound`] if the container is no longer
    /// registered. A run that exceeds the timeout is abandoned and its
    /// container discarded.
    pub async fn run(&self, container_id: &str, code: &str) -> Result<ExecutionResult> {
        let runtime = self.manager.runtime()?.clone();

        if !self.manager.contains(container_id).await {
            return Err(Error::NotFound(format!("container {}", container_id)));
        }

        let path = staging_path(&self.workdir);
        info!(container_id = %container_id, path = %path, "Executing code");

        let staged = self.stage_and_run(runtime.as_ref(), container_id, &path, code);
        match tokio::time::timeout(self.timeout, staged).await {
            Ok(result) => {
                // Best effort: the file is only garbage in a shared container
                let cleanup = runtime.exec(container_id, shell(format!("rm -f {}", path)));
                match tokio::time::timeout(self.timeout, cleanup).await {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => {
                        debug!(container_id = %container_id, error = %e, "Failed to remove staged file")
                    }
                    Err(_) => {
                        warn!(container_id = %container_id, path = %path, "Timed out removing staged file")
                    }
                }
                Ok(result)
            }
            Err(_) => {
                warn!(
                    container_id = %container_id,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Execution timed out; discarding container"
                );
                self.manager.discard(container_id).await;
                Ok(ExecutionResult::timeout(self.timeout))
            }
        }
    }

    async fn stage_and_run(
        &self,
        runtime: &dyn ContainerRuntime,
        id: &str,
        path: &str,
        code: &str,
    ) -> ExecutionResult {
        if let Err(e) = runtime.exec(id, shell(format!("touch {}", path))).await {
            return ExecutionResult::failure(format!("Error writing code to file: {}", e));
        }

        match runtime.exec(id, shell(write_command(path, code))).await {
            Ok(out) if out.succeeded() => {}
            Ok(out) => {
                warn!(container_id = %id, exit_code = ?out.exit_code, "Failed to stage code");
                let mut output = b"Error writing code to file: ".to_vec();
                output.extend_from_slice(&out.output);
                return ExecutionResult {
                    success: false,
                    output,
                    exit_code: None,
                };
            }
            Err(e) => {
                return ExecutionResult::failure(format!("Error writing code to file: {}", e));
            }
        }

        match runtime
            .exec(id, vec![self.interpreter.clone(), path.to_string()])
            .await
        {
            Ok(out) => {
                debug!(container_id = %id, exit_code = ?out.exit_code, "Execution finished");
                ExecutionResult::from(out)
            }
            Err(e @ Error::Runtime(_)) => ExecutionResult::failure(format!("Container error: {}", e)),
            Err(e) => ExecutionResult::failure(format!("Error executing code: {}", e)),
        }
    }
}
