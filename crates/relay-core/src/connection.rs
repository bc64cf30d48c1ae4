//! Connection handling and lifecycle types.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::error::{TransportError, TransportResult};
use crate::message::IrcMessage;

/// Longest text payload put into a single outbound message, in bytes.
///
/// Servers cap a full line at 512 bytes including the prefix they prepend when
/// relaying, so the payload is kept well under that.
pub const MAX_TEXT_BYTES: usize = 400;

// =============================================================================
// Client Configuration
// =============================================================================

/// Where and how to open a network connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server host name.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Wrap the TCP stream in TLS.
    pub use_tls: bool,
    /// Skip certificate verification (self-signed servers).
    pub accept_invalid_certs: bool,
    /// Upper bound for TCP connect plus TLS handshake.
    pub connect_timeout: Duration,
}

impl ClientConfig {
    /// Creates a plaintext config for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            use_tls: false,
            accept_invalid_certs: false,
            connect_timeout: Duration::from_secs(30),
        }
    }

    /// Enables TLS.
    pub fn with_tls(mut self, accept_invalid_certs: bool) -> Self {
        self.use_tls = true;
        self.accept_invalid_certs = accept_invalid_certs;
        self
    }

    /// Returns `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of one network connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport session.
    #[default]
    Disconnected,
    /// Opening the transport or waiting for the welcome reply.
    Connecting,
    /// Welcome reply received, joins issued.
    Registered,
    /// At least one channel join confirmed.
    Joined,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Registered => write!(f, "Registered"),
            Self::Joined => write!(f, "Joined"),
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// Something the transport observed on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One received protocol line, without its line terminator.
    Line(String),
    /// The connection is gone; no further events follow.
    Closed {
        /// Why the connection ended.
        reason: String,
    },
}

/// A live transport session: the send side plus the receive queue.
#[derive(Debug)]
pub struct Session {
    /// Handle for outbound lines.
    pub handle: ConnectionHandle,
    /// Received lines in arrival order.
    pub events: mpsc::Receiver<TransportEvent>,
}

// =============================================================================
// Handle
// =============================================================================

/// Handle to a client connection.
///
/// Cloning is cheap and every clone may send concurrently; lines from one
/// sender keep their order, lines from different senders may interleave.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// Name of the network this connection belongs to.
    pub id: Arc<str>,
    /// Sender for outgoing lines.
    line_tx: mpsc::Sender<String>,
    /// Shutdown signal sender.
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl ConnectionHandle {
    /// Creates a new connection handle.
    pub fn new(
        id: impl Into<Arc<str>>,
        line_tx: mpsc::Sender<String>,
        shutdown_tx: watch::Sender<bool>,
    ) -> Self {
        Self {
            id: id.into(),
            line_tx,
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// Queues one raw protocol line. The terminator is added by the transport.
    pub async fn send_line(&self, line: String) -> TransportResult<()> {
        self.line_tx
            .send(line)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    /// Queues a protocol message.
    pub async fn send(&self, message: &IrcMessage) -> TransportResult<()> {
        self.send_line(message.to_string()).await
    }

    /// Joins a channel.
    pub async fn join(&self, channel: &str) -> TransportResult<()> {
        self.send(&IrcMessage::join(channel)).await
    }

    /// Sends text to a channel or nickname, split into safe-sized messages.
    pub async fn privmsg(&self, target: &str, text: &str) -> TransportResult<()> {
        for chunk in split_text(text) {
            self.send(&IrcMessage::privmsg(target, chunk)).await?;
        }
        Ok(())
    }

    /// Sends a notice, split the same way as [`privmsg`](Self::privmsg).
    pub async fn notice(&self, target: &str, text: &str) -> TransportResult<()> {
        for chunk in split_text(text) {
            self.send(&IrcMessage::notice(target, chunk)).await?;
        }
        Ok(())
    }

    /// Answers a keepalive PING.
    pub async fn pong(&self, payload: &str) -> TransportResult<()> {
        self.send(&IrcMessage::pong(payload)).await
    }

    /// Requests a nickname.
    pub async fn nick(&self, nickname: &str) -> TransportResult<()> {
        self.send(&IrcMessage::nick(nickname)).await
    }

    /// Sends `QUIT`.
    pub async fn quit(&self, reason: &str) -> TransportResult<()> {
        self.send(&IrcMessage::quit(reason)).await
    }

    /// Closes this connection.
    pub fn close(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}

/// Splits text on line breaks and into chunks of at most [`MAX_TEXT_BYTES`].
///
/// Line breaks inside a reply would otherwise end the protocol line early and
/// let the rest be read as a raw command.
pub fn split_text(text: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    for line in text.split(['\r', '\n']) {
        let mut rest = line;
        while rest.len() > MAX_TEXT_BYTES {
            let mut cut = MAX_TEXT_BYTES;
            while !rest.is_char_boundary(cut) {
                cut -= 1;
            }
            let (head, tail) = rest.split_at(cut);
            chunks.push(head);
            rest = tail;
        }
        if !rest.is_empty() {
            chunks.push(rest);
        }
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ConnectionHandle, mpsc::Receiver<String>) {
        let (line_tx, line_rx) = mpsc::channel(16);
        let (shutdown_tx, _) = watch::channel(false);
        (ConnectionHandle::new("test", line_tx, shutdown_tx), line_rx)
    }

    #[test]
    fn test_split_text_breaks_lines() {
        assert_eq!(split_text("one\r\ntwo\nthree"), vec!["one", "two", "three"]);
        assert!(split_text("\n\n").is_empty());
    }

    #[test]
    fn test_split_text_respects_char_boundaries() {
        let text = "é".repeat(300);
        let chunks = split_text(&text);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() <= MAX_TEXT_BYTES));
        assert_eq!(chunks.concat(), text);
    }

    #[tokio::test]
    async fn test_privmsg_cannot_inject_commands() {
        let (handle, mut rx) = handle();
        handle.privmsg("#rust", "hi\r\nQUIT :bye").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "PRIVMSG #rust hi");
        assert_eq!(rx.recv().await.unwrap(), "PRIVMSG #rust :QUIT :bye");
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped_fails() {
        let (handle, rx) = handle();
        drop(rx);
        assert!(matches!(
            handle.join("#rust").await,
            Err(TransportError::SendFailed(_))
        ));
    }

    #[test]
    fn test_close_sets_flag() {
        let (handle, _rx) = handle();
        assert!(!handle.is_closed());
        handle.close();
        assert!(handle.is_closed());
    }

    #[test]
    fn test_client_config_addr() {
        let config = ClientConfig::new("irc.libera.chat", 6697).with_tls(false);
        assert_eq!(config.addr(), "irc.libera.chat:6697");
        assert!(config.use_tls);
    }
}
