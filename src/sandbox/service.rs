//! Sandbox service
//!
//! The [`CodeExecutor`] behind the HTTP surface: acquires a container from
//! the lifecycle manager and hands it to the execution engine.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{ReusePolicy, SandboxConfig};
use crate::error::Result;
use crate::sandbox::executor::{
    CodeExecutor, ExecutionEngine, ExecutionRequest, ExecutionResult, NO_CODE_PROVIDED,
};
use crate::sandbox::lifecycle::LifecycleManager;

/// Container-backed code executor
pub struct SandboxService {
    manager: Arc<LifecycleManager>,
    engine: ExecutionEngine,
    reuse: ReusePolicy,
}

impl SandboxService {
    pub fn new(manager: Arc<LifecycleManager>, config: &SandboxConfig) -> Self {
        let engine = ExecutionEngine::new(manager.clone(), config);
        SandboxService {
            manager,
            engine,
            reuse: config.reuse,
        }
    }

    pub fn manager(&self) -> &Arc<LifecycleManager> {
        &self.manager
    }
}

#[async_trait]
impl CodeExecutor for SandboxService {
    fn name(&self) -> &str {
        "container"
    }

    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        if request.code.is_empty() {
            return Ok(ExecutionResult::failure(NO_CODE_PROVIDED));
        }

        let id = self.manager.acquire().await?;
        let result = self.engine.run(&id, &request.code).await;

        if self.reuse == ReusePolicy::OneShot && self.manager.discard(&id).await {
            debug!(container_id = %id, "Discarded one-shot container");
        }

        let result = result?;
        info!(
            container_id = %id,
            success = result.success,
            exit_code = ?result.exit_code,
            "Execution completed"
        );
        Ok(result)
    }

    async fn container_count(&self) -> usize {
        self.manager.container_count()
    }
}
