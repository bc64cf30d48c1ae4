//! Dispatch router.
//!
//! Keepalives and CTCP queries are answered inline on the caller's task.
//! Commands and links each get their own task so a slow backend never holds up
//! the next received line.

use std::future::Future;
use std::sync::Arc;

use relay_core::{
    CommandRequest, ConnectionHandle, GatewayCapability, GatewayResult, LinkRequest, ctcp_wrap,
};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::classifier::{CtcpKind, Intent};

/// Prefix put in front of every link title reply.
pub const TITLE_PREFIX: &str = "Title: ";

/// Command answered by the quote service when one is configured.
pub const QUOTE_COMMAND: &str = "rexpl";

/// Routes classified intents to connection primitives or the backend.
#[derive(Clone)]
pub struct Router {
    gateway: Arc<dyn GatewayCapability>,
    version_reply: Arc<str>,
    limiter: Option<Arc<Semaphore>>,
}

impl Router {
    /// Creates a router with unbounded backend fan-out.
    pub fn new(gateway: Arc<dyn GatewayCapability>, version_reply: impl Into<Arc<str>>) -> Self {
        Self {
            gateway,
            version_reply: version_reply.into(),
            limiter: None,
        }
    }

    /// Bounds the number of backend calls in flight at once.
    ///
    /// Tasks over the limit wait for a permit; none are dropped. Limits above
    /// [`Semaphore::MAX_PERMITS`] are clamped to it.
    pub fn with_max_concurrent(mut self, limit: usize) -> Self {
        self.limiter = Some(Arc::new(Semaphore::new(limit.min(Semaphore::MAX_PERMITS))));
        self
    }

    /// Acts on one intent.
    ///
    /// Returns the spawned task for commands and links, `None` otherwise.
    /// Inline sends that fail are logged; the caller's loop notices a dead
    /// connection through its own event stream.
    pub async fn dispatch(&self, intent: Intent, handle: &ConnectionHandle) -> Option<JoinHandle<()>> {
        match intent {
            Intent::Ping(payload) => {
                trace!(network = %handle.id, payload = %payload, "PING -> PONG");
                if let Err(e) = handle.pong(&payload).await {
                    warn!(network = %handle.id, error = %e, "Failed to answer keepalive");
                }
                None
            }
            Intent::CtcpQuery { kind, responder } => {
                let reply = self.ctcp_reply(&kind);
                debug!(network = %handle.id, nick = %responder, query = ?kind, "Answering CTCP query");
                if let Err(e) = handle.notice(&responder, &reply).await {
                    warn!(network = %handle.id, nick = %responder, error = %e, "Failed to answer CTCP query");
                }
                None
            }
            Intent::Command {
                name,
                args,
                channel,
                user,
            } => {
                debug!(network = %handle.id, command = %name, channel = %channel, "Dispatching command");
                let gateway = self.gateway.clone();
                let request = CommandRequest {
                    command: name,
                    args,
                    channel: channel.clone(),
                    user,
                };
                Some(self.spawn_reply(handle.clone(), channel, "command", async move {
                    if request.command == QUOTE_COMMAND
                        && let Some(quote) = gateway.fetch_quote(&request.args).await?
                    {
                        return Ok(non_empty(quote.reply()));
                    }
                    gateway
                        .run_command(&request)
                        .await
                        .map(non_empty)
                }))
            }
            Intent::Link { url, channel, user } => {
                debug!(network = %handle.id, url = %url, channel = %channel, "Dispatching link");
                let gateway = self.gateway.clone();
                let request = LinkRequest {
                    url,
                    channel: channel.clone(),
                    user,
                };
                Some(self.spawn_reply(handle.clone(), channel, "link", async move {
                    gateway
                        .fetch_title(&request)
                        .await
                        .map(|title| non_empty(title).map(|t| format!("{TITLE_PREFIX}{t}")))
                }))
            }
            Intent::Ignored => None,
        }
    }

    fn ctcp_reply(&self, kind: &CtcpKind) -> String {
        match kind {
            CtcpKind::Version => ctcp_wrap("VERSION", &self.version_reply),
            CtcpKind::Time => ctcp_wrap("TIME", &chrono::Local::now().to_rfc2822()),
            CtcpKind::Ping(payload) => ctcp_wrap("PING", payload),
        }
    }

    /// Spawns one backend call and sends its reply, if any, to `target`.
    fn spawn_reply<F>(
        &self,
        handle: ConnectionHandle,
        target: String,
        kind: &'static str,
        call: F,
    ) -> JoinHandle<()>
    where
        F: Future<Output = GatewayResult<Option<String>>> + Send + 'static,
    {
        let limiter = self.limiter.clone();
        tokio::spawn(async move {
            let _permit = match limiter {
                Some(limiter) => match limiter.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return,
                },
                None => None,
            };

            match call.await {
                Ok(Some(reply)) => {
                    if let Err(e) = handle.privmsg(&target, &reply).await {
                        warn!(network = %handle.id, channel = %target, error = %e, "Failed to send reply");
                    } else {
                        debug!(network = %handle.id, channel = %target, kind, "Reply sent");
                    }
                }
                Ok(None) => debug!(network = %handle.id, channel = %target, kind, "Empty reply"),
                Err(e) => warn!(network = %handle.id, channel = %target, kind, error = %e, "Backend call failed"),
            }
        })
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("version_reply", &self.version_reply)
            .field("limit", &self.limiter.as_ref().map(|l| l.available_permits()))
            .finish()
    }
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}
