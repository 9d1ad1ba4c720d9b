//! code-exec server
//!
//! Connects to the container runtime, reaps containers left behind by a
//! previous run, and serves the execution API until interrupted.

use clap::Parser;
use code_exec::config::{apply_env_overrides, load_config, load_config_from_path, validate_config, Config};
use code_exec::sandbox::{CodeExecutor, LifecycleManager, SandboxService};
use code_exec::server::build_router;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

// ---- CLI ----

#[derive(Parser)]
#[command(name = "code-exec-server", version, about = "Sandboxed code execution server")]
struct Args {
    /// Config file (JSON5 or TOML)
    #[arg(long, short, env = "CODE_EXEC_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(long)]
    bind: Option<String>,

    /// Port
    #[arg(long, short)]
    port: Option<u16>,
}

fn load(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = load_config_from_path(path)?;
            apply_env_overrides(&mut config);
            config
        }
        None => load_config()?,
    };

    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    Ok(config)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

// ---- Main ----

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "code_exec=info,code_exec_server=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = load(&args)?;

    let validation = validate_config(&config);
    for warning in &validation.warnings {
        warn!("Config warning: {}", warning);
    }
    if !validation.valid {
        for issue in &validation.errors {
            error!("Config error: {}", issue);
        }
        anyhow::bail!("Invalid configuration ({} error(s))", validation.errors.len());
    }

    info!(
        "{} v{} starting (image {}, reuse {})",
        code_exec::NAME,
        code_exec::VERSION,
        config.sandbox.container.image,
        config.sandbox.reuse
    );

    // Runtime
    let manager = Arc::new(LifecycleManager::connect(&config.sandbox).await);
    if !manager.is_degraded() {
        match manager.reap_orphans().await {
            Ok(0) => {}
            Ok(n) => info!("Removed {} orphaned container(s)", n),
            Err(e) => warn!(error = %e, "Failed to reap orphaned containers"),
        }
    }

    let sweeper = config
        .sandbox
        .sweep_interval
        .filter(|_| !manager.is_degraded())
        .map(|interval| manager.clone().spawn_sweeper(interval));

    let executor: Arc<dyn CodeExecutor> =
        Arc::new(SandboxService::new(manager.clone(), &config.sandbox));
    let app = build_router(executor);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    manager.shutdown().await;
    info!("Stopped");

    Ok(())
}
