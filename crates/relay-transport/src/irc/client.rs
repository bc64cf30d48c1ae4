//! Chat client capability implementation.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_native_tls::native_tls;
use tokio_util::codec::Framed;
use tracing::{debug, info, trace, warn};

use relay_core::{
    ClientConfig, ConnectionHandle, IrcClientCapability, Session, TransportError, TransportEvent,
    TransportResult,
};

use super::codec::LineCodec;

/// Depth of the outbound and inbound line queues.
const QUEUE_DEPTH: usize = 256;

trait IrcStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> IrcStream for T {}

type LineStream = Framed<Box<dyn IrcStream>, LineCodec>;
type LineSink = SplitSink<LineStream, String>;
type LineSource = SplitStream<LineStream>;

/// Chat client capability over TCP with optional TLS.
pub struct IrcClientCapabilityImpl;

impl IrcClientCapabilityImpl {
    /// Creates a new chat client capability.
    pub fn new() -> Self {
        Self
    }
}

impl Default for IrcClientCapabilityImpl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IrcClientCapability for IrcClientCapabilityImpl {
    async fn connect(&self, network: &str, config: &ClientConfig) -> TransportResult<Session> {
        let addr = config.addr();
        info!(network = %network, addr = %addr, tls = config.use_tls, "Connecting to server");

        let stream = tokio::time::timeout(config.connect_timeout, open_stream(config))
            .await
            .map_err(|_| TransportError::Timeout { addr: addr.clone() })??;
        let session = start_session(network, stream, QUEUE_DEPTH);

        info!(network = %network, addr = %addr, "Transport connected");
        Ok(session)
    }
}

/// Spawns the I/O task for an open stream and returns its session.
fn start_session(network: &str, stream: Box<dyn IrcStream>, depth: usize) -> Session {
    let (sink, source) = Framed::new(stream, LineCodec::new()).split();

    let (line_tx, line_rx) = mpsc::channel::<String>(depth);
    let (event_tx, event_rx) = mpsc::channel::<TransportEvent>(depth);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(run_io_loop(
        network.to_string(),
        sink,
        source,
        line_rx,
        shutdown_rx,
        event_tx,
    ));

    Session {
        handle: ConnectionHandle::new(network, line_tx, shutdown_tx),
        events: event_rx,
    }
}

/// Opens the TCP stream and wraps it in TLS when configured.
async fn open_stream(config: &ClientConfig) -> TransportResult<Box<dyn IrcStream>> {
    let addr = config.addr();
    let tcp = TcpStream::connect(&addr)
        .await
        .map_err(|e| TransportError::ConnectionFailed {
            addr: addr.clone(),
            reason: e.to_string(),
        })?;

    if !config.use_tls {
        return Ok(Box::new(tcp));
    }

    if config.accept_invalid_certs {
        warn!(addr = %addr, "Certificate verification disabled");
    }
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .build()
        .map_err(|e| TransportError::Tls(e.to_string()))?;
    let tls = tokio_native_tls::TlsConnector::from(connector)
        .connect(&config.host, tcp)
        .await
        .map_err(|e| TransportError::Tls(format!("handshake with {addr} failed: {e}")))?;
    Ok(Box::new(tls))
}

/// Moves lines between the socket and the session queues until either side ends.
///
/// At most one received line waits for room in the event queue. While it
/// waits the socket is not read, but outbound lines keep flowing, so a full
/// event queue never stalls senders on the handle.
///
/// Always finishes by emitting exactly one [`TransportEvent::Closed`].
async fn run_io_loop(
    network: String,
    mut sink: LineSink,
    mut source: LineSource,
    mut line_rx: mpsc::Receiver<String>,
    mut shutdown_rx: watch::Receiver<bool>,
    event_tx: mpsc::Sender<TransportEvent>,
) {
    let mut pending: Option<String> = None;

    let reason = loop {
        tokio::select! {
            biased;

            // Outbound lines first so a QUIT queued before close() is written
            outbound = line_rx.recv() => match outbound {
                Some(line) => {
                    trace!(network = %network, line = %line, "-> line");
                    if let Err(e) = sink.send(line).await {
                        break format!("write failed: {e}");
                    }
                }
                None => {
                    let _ = sink.close().await;
                    break "all handles dropped".to_string();
                }
            },

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    while let Ok(line) = line_rx.try_recv() {
                        if sink.send(line).await.is_err() {
                            break;
                        }
                    }
                    let _ = sink.close().await;
                    break "closed locally".to_string();
                }
            }

            permit = event_tx.reserve(), if pending.is_some() => match permit {
                Ok(permit) => {
                    if let Some(line) = pending.take() {
                        permit.send(TransportEvent::Line(line));
                    }
                }
                Err(_) => {
                    let _ = sink.close().await;
                    break "session dropped".to_string();
                }
            },

            inbound = source.next(), if pending.is_none() => match inbound {
                Some(Ok(line)) => {
                    trace!(network = %network, line = %line, "<- line");
                    pending = Some(line);
                }
                Some(Err(e)) => break format!("read failed: {e}"),
                None => break "connection closed by server".to_string(),
            },
        }
    };

    debug!(network = %network, reason = %reason, "Transport loop finished");

    // Senders blocked on a full line queue fail instead of waiting on us
    drop(line_rx);
    if let Some(line) = pending {
        let _ = event_tx.send(TransportEvent::Line(line)).await;
    }
    let _ = event_tx.send(TransportEvent::Closed { reason }).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, ClientConfig) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, ClientConfig::new("127.0.0.1", port))
    }

    #[tokio::test]
    async fn test_lines_flow_both_ways() {
        let (listener, config) = listener().await;
        let client = IrcClientCapabilityImpl::new();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            write.write_all(b"PING :irc.test\r\n").await.unwrap();
            let mut lines = BufReader::new(read).lines();
            let got = lines.next_line().await.unwrap().unwrap();
            drop(write);
            got
        });

        let mut session = client.connect("test", &config).await.unwrap();
        assert_eq!(
            session.events.recv().await.unwrap(),
            TransportEvent::Line("PING :irc.test".into())
        );
        session.handle.pong("irc.test").await.unwrap();

        assert_eq!(server.await.unwrap(), "PONG irc.test");
        assert!(matches!(
            session.events.recv().await.unwrap(),
            TransportEvent::Closed { .. }
        ));
    }

    #[tokio::test]
    async fn test_close_flushes_queued_quit() {
        let (listener, config) = listener().await;
        let client = IrcClientCapabilityImpl::new();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(socket).lines();
            let mut seen = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                seen.push(line);
            }
            seen
        });

        let mut session = client.connect("test", &config).await.unwrap();
        session.handle.quit("bye").await.unwrap();
        session.handle.close();

        match session.events.recv().await.unwrap() {
            TransportEvent::Closed { reason } => assert_eq!(reason, "closed locally"),
            other => panic!("expected close, got {other:?}"),
        }
        assert_eq!(server.await.unwrap(), vec!["QUIT bye"]);
    }

    #[tokio::test]
    async fn test_full_event_queue_does_not_block_senders() {
        let (listener, config) = listener().await;

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            for i in 0..10 {
                write.write_all(format!("PING :{i}\r\n").as_bytes()).await.unwrap();
            }
            let mut lines = BufReader::new(read).lines();
            let mut seen = Vec::new();
            for _ in 0..5 {
                seen.push(lines.next_line().await.unwrap().unwrap());
            }
            seen
        });

        let tcp = TcpStream::connect(config.addr()).await.unwrap();
        let mut session = start_session("test", Box::new(tcp), 1);

        // Let the inbound side fill the event queue before sending
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let sends = async {
            for i in 0..5 {
                session.handle.privmsg("#rust", &format!("reply {i}")).await.unwrap();
            }
        };
        tokio::time::timeout(std::time::Duration::from_secs(5), sends)
            .await
            .expect("senders stalled behind a full event queue");

        assert_eq!(
            server.await.unwrap(),
            (0..5).map(|i| format!("PRIVMSG #rust :reply {i}")).collect::<Vec<_>>()
        );
        for i in 0..10 {
            assert_eq!(
                session.events.recv().await.unwrap(),
                TransportEvent::Line(format!("PING :{i}"))
            );
        }
    }

    #[tokio::test]
    async fn test_refused_connection_is_reported() {
        let (listener, config) = listener().await;
        drop(listener);

        let result = IrcClientCapabilityImpl::new().connect("test", &config).await;
        assert!(matches!(
            result,
            Err(TransportError::ConnectionFailed { .. })
        ));
    }
}
