//! # code-exec
//!
//! A sandboxed code-execution backend. Source text posted over HTTP is run
//! inside a Docker container that is provisioned on demand, kept warm for
//! reuse, and evicted once it outlives its time-to-live.
//!
//! ## Layout
//!
//! - [`config`]: configuration file, environment overrides, validation
//! - [`sandbox`]: runtime adapter, lifecycle manager, execution engine
//! - [`server`]: the axum router

pub mod config;
pub mod error;
pub mod sandbox;
pub mod server;

pub use config::Config;
pub use error::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
