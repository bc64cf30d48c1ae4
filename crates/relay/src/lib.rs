//! # Relay
//!
//! A chat relay that stays connected to several networks at once and hands
//! work to an external HTTP backend.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐ lines  ┌────────────┐ Intent ┌────────┐ POST ┌─────────┐
//! │ NetworkManager │───────▶│ classify() │───────▶│ Router │─────▶│ backend │
//! │  (per network) │        └────────────┘        └────────┘      └─────────┘
//! └────────────────┘◀──────────── replies (PRIVMSG / NOTICE / PONG) ───┘
//! ```
//!
//! - **Runtime**: loads configuration, starts one lifecycle manager per network
//! - **Lifecycle**: connect with backoff, register, join, rejoin on kick
//! - **Classifier**: keepalive, CTCP, dot-commands, links, everything else ignored
//! - **Router**: answers inline or spawns backend calls; failures are only logged
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use relay::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = RelayRuntime::builder().config_file("relay.yaml").build()?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `yaml-config`: YAML configuration files (default)
//! - `toml-config`: TOML configuration files
//! - `json-log`: JSON log output

pub use relay_core as core;
pub use relay_framework as framework;
pub use relay_runtime as runtime;
pub use relay_transport as transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use relay_runtime::{RelayConfig, RelayRuntime, RuntimeError, RuntimeResult};

    pub use relay_core::{
        ConnectionHandle, GatewayCapability, IrcClientCapability, IrcMessage, TransportContext,
    };
    pub use relay_framework::{ClassifierRules, Intent, Router, classify};
}
