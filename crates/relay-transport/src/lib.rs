//! # Relay Transport
//!
//! Network capability implementations for the chat relay.
//!
//! This crate provides concrete implementations of the capabilities defined in
//! `relay-core`. Each transport sits behind a feature flag.
//!
//! ## Features
//!
//! - `irc-client`: line-based chat client over TCP, optionally TLS
//! - `http-client`: backend gateway over HTTP POST
//! - `full`: all capabilities
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  relay-runtime      │  (uses capabilities)
//! ├─────────────────────┤
//! │  relay-core         │  (capability traits)
//! ├─────────────────────┤
//! │  relay-transport    │  <- This crate (implementations)
//! ├─────────────────────┤
//! │  Network (TCP/HTTP) │
//! └─────────────────────┘
//! ```
//!
//! ## Capability Implementations
//!
//! | Capability | Implementation | Use Case |
//! |------------|----------------|----------|
//! | `IrcClientCapability` | [`IrcClientCapabilityImpl`] | Connect to chat servers |
//! | `GatewayCapability` | [`HttpGateway`] | Call the processing backend |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use relay_core::{ClientConfig, IrcClientCapability};
//! use relay_transport::IrcClientCapabilityImpl;
//!
//! let client = IrcClientCapabilityImpl::new();
//! let config = ClientConfig::new("irc.libera.chat", 6697).with_tls(false);
//! let mut session = client.connect("libera", &config).await?;
//! session.handle.nick("relay").await?;
//! ```

#[cfg(feature = "http-client")]
pub mod http;

#[cfg(feature = "irc-client")]
pub mod irc;

#[cfg(feature = "irc-client")]
pub use irc::IrcClientCapabilityImpl;

#[cfg(feature = "http-client")]
pub use http::HttpGateway;
