//! Container lifecycle management
//!
//! Owns the container registry and decides, per request, whether to reuse
//! the warm sandbox container or provision a new one. Eviction and the
//! reuse-or-provision decision run under a single lock, so two concurrent
//! requests can never both provision, and a request can never be handed a
//! container that is being evicted. The registry size is mirrored in an
//! atomic so health checks never wait on a provisioning call.

use chrono::{Local, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{ContainerConfig, PullPolicy, ReusePolicy, SandboxConfig};
use crate::error::{Error, Result};
use crate::sandbox::docker::DockerRuntime;
use crate::sandbox::normalize::decode_lossy;
use crate::sandbox::provision::{build_template, container_name, ProvisioningTemplate};
use crate::sandbox::registry::{ContainerRecord, ContainerRegistry};
use crate::sandbox::runtime::{shell, ContainerRuntime};

/// Manages the lifecycle of sandbox containers
pub struct LifecycleManager {
    /// Runtime client; `None` when the daemon was unreachable at startup
    runtime: Option<Arc<dyn ContainerRuntime>>,
    /// Provisioning settings
    config: ContainerConfig,
    /// Time-to-live of a container
    container_timeout: Duration,
    /// Whether a registered container may serve another request
    reuse: ReusePolicy,
    /// Live containers
    registry: Mutex<ContainerRegistry>,
    /// Registry size, written under the registry lock
    live: AtomicUsize,
}

impl LifecycleManager {
    /// Create a manager over a connected runtime
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: &SandboxConfig) -> Self {
        LifecycleManager {
            runtime: Some(runtime),
            config: config.container.clone(),
            container_timeout: config.container_timeout,
            reuse: config.reuse,
            registry: Mutex::new(ContainerRegistry::new()),
            live: AtomicUsize::new(0),
        }
    }

    /// Create a manager with no runtime. Every acquire fails with a
    /// configuration error; health reporting keeps working.
    pub fn degraded(config: &SandboxConfig) -> Self {
        LifecycleManager {
            runtime: None,
            config: config.container.clone(),
            container_timeout: config.container_timeout,
            reuse: config.reuse,
            registry: Mutex::new(ContainerRegistry::new()),
            live: AtomicUsize::new(0),
        }
    }

    /// Connect to Docker, falling back to degraded mode if the daemon is unreachable
    pub async fn connect(config: &SandboxConfig) -> Self {
        match DockerRuntime::connect(config.docker_host.as_deref()).await {
            Ok(runtime) => Self::new(Arc::new(runtime), config),
            Err(e) => {
                error!(error = %e, "Container runtime unavailable; running without a sandbox");
                Self::degraded(config)
            }
        }
    }

    /// The runtime client, or a configuration error in degraded mode
    pub fn runtime(&self) -> Result<&Arc<dyn ContainerRuntime>> {
        self.runtime.as_ref().ok_or_else(|| {
            Error::Config("container runtime unavailable; no sandbox can be provisioned".to_string())
        })
    }

    pub fn is_degraded(&self) -> bool {
        self.runtime.is_none()
    }

    /// Evict expired containers, then return the id of a live container,
    /// provisioning one if none is left. Under [`ReusePolicy::OneShot`] a
    /// fresh container is provisioned for every caller.
    pub async fn acquire(&self) -> Result<String> {
        let runtime = self.runtime()?;
        let mut registry = self.registry.lock().await;

        self.evict_expired_locked(runtime.as_ref(), &mut registry).await;

        if self.reuse == ReusePolicy::Shared {
            if let Some(id) = registry.any_id() {
                debug!(container_id = %id, "Reusing sandbox container");
                return Ok(id.to_string());
            }
        }

        // The lock is held across provisioning so a concurrent request waits
        // for this container instead of creating its own
        let record = self.provision(runtime.as_ref()).await?;
        let id = record.id.clone();
        info!(container_id = %id, name = %record.name, "Registered sandbox container");
        registry.put(record);
        self.publish(&registry);

        Ok(id)
    }

    /// Run the eviction step on its own. Returns the evicted ids.
    pub async fn evict_expired(&self) -> Vec<String> {
        let Ok(runtime) = self.runtime() else {
            return Vec::new();
        };
        let mut registry = self.registry.lock().await;
        self.evict_expired_locked(runtime.as_ref(), &mut registry).await
    }

    async fn evict_expired_locked(
        &self,
        runtime: &dyn ContainerRuntime,
        registry: &mut ContainerRegistry,
    ) -> Vec<String> {
        let expired = registry.list_expired(self.container_timeout, Utc::now());

        for id in &expired {
            // Unregister first: a leaked container beats a registry entry
            // pointing at a dead one
            registry.remove(id);
            match teardown(runtime, id).await {
                Ok(()) => info!(container_id = %id, "Removed expired container"),
                Err(e) => {
                    warn!(container_id = %id, error = %e, "Failed to remove expired container")
                }
            }
        }

        self.publish(registry);
        expired
    }

    fn publish(&self, registry: &ContainerRegistry) {
        self.live.store(registry.len(), Ordering::Release);
    }

    /// Pull, create, start and initialize a new container
    async fn provision(&self, runtime: &dyn ContainerRuntime) -> Result<ContainerRecord> {
        let template = build_template(&self.config)?;

        match template.pull_policy {
            PullPolicy::Always => runtime.pull_image(&template.image).await?,
            PullPolicy::IfNotPresent => {
                if !runtime.image_exists(&template.image).await? {
                    runtime.pull_image(&template.image).await?;
                }
            }
        }

        let name = container_name(&template.name_prefix, Local::now());
        info!(name = %name, image = %template.image, "Creating sandbox container");

        let id = runtime.create_container(&name, &template).await?;

        if let Err(e) = initialize(runtime, &id, &template).await {
            error!(container_id = %id, error = %e, "Failed to initialize sandbox container");
            if let Err(cleanup) = teardown(runtime, &id).await {
                warn!(container_id = %id, error = %cleanup, "Failed to clean up container after provisioning failure");
            }
            return Err(e);
        }

        info!(container_id = %id, "Sandbox container ready");
        Ok(ContainerRecord::new(id, name, Utc::now()))
    }

    /// Unregister a container and tear it down. Used for containers that can
    /// no longer be trusted (timed-out executions) and for one-shot reuse.
    pub async fn discard(&self, id: &str) -> bool {
        let removed = {
            let mut registry = self.registry.lock().await;
            let removed = registry.remove(id).is_some();
            self.publish(&registry);
            removed
        };
        if !removed {
            return false;
        }

        if let Ok(runtime) = self.runtime() {
            match teardown(runtime.as_ref(), id).await {
                Ok(()) => info!(container_id = %id, "Discarded sandbox container"),
                Err(e) => warn!(container_id = %id, error = %e, "Failed to discard container"),
            }
        }
        true
    }

    /// Whether the container is still registered
    pub async fn contains(&self, id: &str) -> bool {
        self.registry.lock().await.contains(id)
    }

    #[cfg(test)]
    pub(crate) async fn insert_record(&self, record: ContainerRecord) {
        let mut registry = self.registry.lock().await;
        registry.put(record);
        self.publish(&registry);
    }

    /// Number of registered containers. Does not wait for the registry
    /// lock, so it stays responsive while a container is provisioning.
    pub fn container_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Remove containers carrying our name prefix that the registry does not
    /// know about, left behind by an earlier process. Returns how many were
    /// removed.
    pub async fn reap_orphans(&self) -> Result<usize> {
        let runtime = self.runtime()?;
        let registry = self.registry.lock().await;

        let orphans: Vec<_> = runtime
            .list_containers(&self.config.name_prefix)
            .await?
            .into_iter()
            .filter(|c| !registry.contains(&c.id))
            .collect();

        let mut reaped = 0;
        for orphan in orphans {
            match runtime.remove_container(&orphan.id).await {
                Ok(()) => {
                    info!(container_id = %orphan.id, name = %orphan.name, "Removed orphaned container");
                    reaped += 1;
                }
                Err(e) => {
                    warn!(container_id = %orphan.id, error = %e, "Failed to remove orphaned container")
                }
            }
        }

        Ok(reaped)
    }

    /// Stop and remove every registered container. Failures are logged and
    /// skipped.
    pub async fn shutdown(&self) {
        let records = {
            let mut registry = self.registry.lock().await;
            let records = registry.drain();
            self.publish(&registry);
            records
        };
        let Ok(runtime) = self.runtime() else {
            return;
        };

        info!(count = records.len(), "Cleaning up sandbox containers");
        for record in records {
            if let Err(e) = teardown(runtime.as_ref(), &record.id).await {
                debug!(container_id = %record.id, error = %e, "Cleanup failed during shutdown");
            }
        }
    }

    /// Periodically run the eviction step in the background
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = self.evict_expired().await;
                if !evicted.is_empty() {
                    info!(count = evicted.len(), "Eviction sweep removed expired containers");
                }
            }
        })
    }
}

/// Start the container and run the init commands in order
async fn initialize(
    runtime: &dyn ContainerRuntime,
    id: &str,
    template: &ProvisioningTemplate,
) -> Result<()> {
    runtime.start_container(id).await?;

    info!(container_id = %id, commands = template.init_commands.len(), "Initializing sandbox container");
    for cmd in &template.init_commands {
        let result = runtime.exec(id, shell(cmd.as_str())).await?;
        if !result.succeeded() {
            return Err(Error::Provisioning(format!(
                "Init command `{}` failed (exit code {}): {}",
                cmd,
                result
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                decode_lossy(&result.output).trim_end()
            )));
        }
        debug!(container_id = %id, command = %cmd, "Init command succeeded");
    }

    Ok(())
}

/// Stop then remove a container. Removal is attempted even if stopping fails.
async fn teardown(runtime: &dyn ContainerRuntime, id: &str) -> Result<()> {
    let stopped = runtime.stop_container(id).await;
    let removed = runtime.remove_container(id).await;
    stopped.and(removed)
}
