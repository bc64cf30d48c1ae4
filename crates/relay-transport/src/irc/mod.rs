//! Chat network transport.
//!
//! This module provides line framing and the TCP/TLS client.

mod client;
mod codec;

pub use client::IrcClientCapabilityImpl;
pub use codec::{LineCodec, MAX_LINE_BYTES};
