//! Capability traits implemented by the transport layer.
//!
//! The runtime and the dispatch router only talk to these traits, so tests can
//! swap in in-memory implementations and `relay-transport` stays the only
//! crate that touches sockets.

use std::sync::Arc;

use async_trait::async_trait;

use crate::connection::{ClientConfig, Session};
use crate::error::{GatewayResult, TransportResult};
use crate::gateway::{CommandRequest, LinkRequest, Quote};

/// Opens line-oriented chat connections.
#[async_trait]
pub trait IrcClientCapability: Send + Sync {
    /// Opens one connection to the server described by `config`.
    ///
    /// `network` names the connection in logs and in the returned handle. A
    /// successful return means the transport is up; protocol registration is
    /// the caller's job.
    async fn connect(&self, network: &str, config: &ClientConfig) -> TransportResult<Session>;
}

/// Calls the external processing backend.
#[async_trait]
pub trait GatewayCapability: Send + Sync {
    /// Runs a chat command and returns the reply text (possibly empty).
    async fn run_command(&self, request: &CommandRequest) -> GatewayResult<String>;

    /// Looks up a link title and returns it (possibly empty).
    async fn fetch_title(&self, request: &LinkRequest) -> GatewayResult<String>;

    /// Looks up a random quote, narrowed to `topic` when it is non-empty.
    ///
    /// Returns `Ok(None)` when no quote service is configured.
    async fn fetch_quote(&self, _topic: &str) -> GatewayResult<Option<Quote>> {
        Ok(None)
    }
}

/// The set of capabilities available to the runtime.
#[derive(Clone, Default)]
pub struct TransportContext {
    irc_client: Option<Arc<dyn IrcClientCapability>>,
    gateway: Option<Arc<dyn GatewayCapability>>,
}

impl TransportContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the chat connection capability.
    pub fn with_irc_client(mut self, client: Arc<dyn IrcClientCapability>) -> Self {
        self.irc_client = Some(client);
        self
    }

    /// Sets the backend gateway capability.
    pub fn with_gateway(mut self, gateway: Arc<dyn GatewayCapability>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Returns the chat connection capability.
    pub fn irc_client(&self) -> Option<Arc<dyn IrcClientCapability>> {
        self.irc_client.clone()
    }

    /// Returns the backend gateway capability.
    pub fn gateway(&self) -> Option<Arc<dyn GatewayCapability>> {
        self.gateway.clone()
    }
}

impl std::fmt::Debug for TransportContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportContext")
            .field("irc_client", &self.irc_client.is_some())
            .field("gateway", &self.gateway.is_some())
            .finish()
    }
}
