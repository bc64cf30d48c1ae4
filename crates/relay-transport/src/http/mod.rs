//! HTTP transport capabilities.
//!
//! This module provides the backend gateway client.

#[cfg(feature = "http-client")]
mod client;
#[cfg(feature = "http-client")]
pub use client::{API_KEY_HEADER, DEFAULT_TIMEOUT, HttpGateway};
