//! # Relay Core
//!
//! Protocol types and capability traits shared by every crate of the relay.
//!
//! ## Layers
//!
//! ```text
//! ┌──────────────────────┐
//! │  relay-runtime       │  config, logging, per-network lifecycle
//! ├──────────────────────┤
//! │  relay-framework     │  classifier, dispatch router
//! ├──────────────────────┤
//! │  relay-core          │  <- This crate (types + capability traits)
//! ├──────────────────────┤
//! │  relay-transport     │  TCP/TLS lines, HTTP gateway
//! └──────────────────────┘
//! ```
//!
//! - **Messages**: [`IrcMessage`] parsing and serialization, CTCP framing.
//! - **Connections**: [`ConnectionHandle`], [`Session`], [`ConnectionState`].
//! - **Backend records**: [`CommandRequest`], [`LinkRequest`] and their responses.
//! - **Capabilities**: [`IrcClientCapability`], [`GatewayCapability`].
//! - **Backoff**: [`Backoff`] driven by [`RetryConfig`].

pub mod backoff;
pub mod capability;
pub mod connection;
pub mod ctcp;
pub mod error;
pub mod gateway;
pub mod message;

pub use backoff::{Backoff, RetryConfig};
pub use capability::{GatewayCapability, IrcClientCapability, TransportContext};
pub use connection::{
    ClientConfig, ConnectionHandle, ConnectionState, MAX_TEXT_BYTES, Session, TransportEvent,
    split_text,
};
pub use ctcp::{CTCP_DELIM, ctcp_wrap, parse_ctcp};
pub use error::{GatewayError, GatewayResult, ProtocolError, TransportError, TransportResult};
pub use gateway::{
    CommandRequest, CommandResponse, EndpointConfig, GatewayReply, LinkRequest, LinkResponse, Quote,
};
pub use message::{
    ERR_NICKNAMEINUSE, IrcMessage, RPL_WELCOME, is_channel_name, normalize_channel,
};
