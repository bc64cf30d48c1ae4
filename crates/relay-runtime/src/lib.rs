//! Relay Runtime - Orchestration layer for the chat relay.
//!
//! This crate provides:
//! - Layered configuration loading and validation (`ConfigLoader`, `RelayConfig`)
//! - Logging setup from configuration
//! - Per-network connection lifecycle (`NetworkManager`)
//! - Runtime orchestration and signal handling (`RelayRuntime`)
//!
//! ```ignore
//! use relay_runtime::RelayRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = RelayRuntime::builder().config_file("relay.yaml").build()?;
//!
//!     // Run until Ctrl+C or SIGTERM
//!     runtime.run().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Manual Transport Configuration
//!
//! Tests and embedders can supply their own capabilities:
//!
//! ```ignore
//! use relay_core::TransportContext;
//! use relay_runtime::RelayRuntime;
//!
//! let ctx = TransportContext::new()
//!     .with_irc_client(my_client)
//!     .with_gateway(my_gateway);
//! let runtime = RelayRuntime::new(config, ctx);
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod network;
pub mod registry;
pub mod runtime;

// Re-exports
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, NetworkConfig, Profile, RelayConfig, validate_config,
};
pub use error::{RuntimeError, RuntimeResult};
pub use network::{NetworkManager, NetworkSettings};
pub use registry::{NetworkRegistry, NetworkStatus, RegistryStats};
pub use runtime::{RelayRuntime, RuntimeBuilder};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides all the commonly used logging macros:
/// - `trace!`, `debug!`, `info!`, `warn!`, `error!`
/// - `span`, `event`
/// - `instrument` attribute
/// - `Level` for span creation
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
