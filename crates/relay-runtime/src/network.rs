//! Per-network connection lifecycle.
//!
//! One [`NetworkManager`] owns one network for the life of the process:
//!
//! ```text
//! Disconnected ─► Connecting ─► Registered ─► Joined
//!                   ▲   │ fail        │ closed     │ closed
//!                   │   ▼             ▼            ▼
//!                   └─ backoff ◄──────┴────────────┘
//! ```
//!
//! Connection failures are retried forever with exponential backoff. The
//! backoff resets once the server sends its welcome reply, so a session that
//! drops after registering reconnects at once and starts over from the
//! initial delay.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use relay_core::{
    Backoff, ClientConfig, ConnectionHandle, ConnectionState, ERR_NICKNAMEINUSE, IrcClientCapability,
    IrcMessage, RPL_WELCOME, RetryConfig, Session, TransportEvent,
};
use relay_framework::{ClassifierRules, Router, classify};

use crate::config::RelayConfig;
use crate::registry::NetworkRegistry;

/// Appended to the configured nickname when the server reports it taken.
pub const NICK_SUFFIX: &str = "_";

/// Reason sent with `QUIT` on shutdown.
pub const QUIT_MESSAGE: &str = "Shutting down";

/// How long to wait for the transport to flush `QUIT` before giving up.
const QUIT_GRACE: Duration = Duration::from_secs(2);

// =============================================================================
// Settings
// =============================================================================

/// Immutable settings for one network, captured when its task starts.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSettings {
    /// Network name from the configuration.
    pub name: String,
    /// Desired nickname.
    pub nickname: String,
    /// Real name sent at registration.
    pub realname: String,
    /// Where to connect.
    pub client: ClientConfig,
    /// Channels to join, already normalized.
    pub channels: Vec<String>,
    /// Reconnect backoff.
    pub retry: RetryConfig,
}

impl NetworkSettings {
    /// Builds the settings for network `name`, if it is configured.
    pub fn from_config(config: &RelayConfig, name: &str) -> Option<Self> {
        let network = config.networks.get(name)?;
        Some(Self {
            name: name.to_string(),
            nickname: config.nickname.clone(),
            realname: config.effective_realname().to_string(),
            client: network.to_client_config(),
            channels: network.normalized_channels(),
            retry: config.retry.to_core_retry(),
        })
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionEnd {
    /// Shutdown was requested; do not reconnect.
    Shutdown,
    /// The transport closed.
    Closed(String),
}

/// Mutable per-session state.
#[derive(Debug)]
struct SessionState {
    nickname: String,
    registered: bool,
    tried_alternate: bool,
}

/// Keeps one network connected, joined and answering.
pub struct NetworkManager {
    settings: Arc<NetworkSettings>,
    client: Arc<dyn IrcClientCapability>,
    router: Router,
    rules: Arc<ClassifierRules>,
    registry: NetworkRegistry,
    shutdown: watch::Receiver<bool>,
}

impl NetworkManager {
    /// Creates a manager. Nothing happens until [`run`](Self::run).
    pub fn new(
        settings: NetworkSettings,
        client: Arc<dyn IrcClientCapability>,
        router: Router,
        rules: Arc<ClassifierRules>,
        registry: NetworkRegistry,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        registry.register(&settings.name);
        Self {
            settings: Arc::new(settings),
            client,
            router,
            rules,
            registry,
            shutdown,
        }
    }

    /// Network name.
    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Runs until shutdown is signalled. Never returns on its own otherwise.
    pub async fn run(self) {
        let name = self.settings.name.as_str();
        let mut shutdown = self.shutdown.clone();
        let mut backoff = Backoff::new(self.settings.retry.clone());

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.registry.set_state(name, ConnectionState::Connecting);
            self.registry.record_attempt(name);

            let connected = tokio::select! {
                result = self.client.connect(name, &self.settings.client) => result,
                _ = shutdown_requested(&mut shutdown) => break,
            };

            match connected {
                Ok(session) => {
                    let (end, registered) = self.drive(session, &mut shutdown).await;
                    self.registry.set_state(name, ConnectionState::Disconnected);
                    match end {
                        SessionEnd::Shutdown => break,
                        SessionEnd::Closed(reason) if registered => {
                            warn!(network = %name, reason = %reason, "Connection lost, reconnecting");
                            self.registry.record_reconnect(name);
                            backoff.reset();
                            continue;
                        }
                        SessionEnd::Closed(reason) => {
                            warn!(network = %name, reason = %reason, "Connection closed before registration");
                        }
                    }
                }
                Err(e) => {
                    warn!(network = %name, error = %e, "Connection failed");
                }
            }

            let delay = backoff.next_delay();
            info!(network = %name, delay = ?delay, attempt = backoff.attempts(), "Retrying after backoff");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }

        self.registry.set_state(name, ConnectionState::Disconnected);
        info!(network = %name, "Network task stopped");
    }

    /// Registers and processes one session until it ends.
    ///
    /// Returns how it ended and whether the welcome reply was seen.
    async fn drive(
        &self,
        session: Session,
        shutdown: &mut watch::Receiver<bool>,
    ) -> (SessionEnd, bool) {
        let Session { handle, mut events } = session;
        let name = self.settings.name.as_str();
        let mut state = SessionState {
            nickname: self.settings.nickname.clone(),
            registered: false,
            tried_alternate: false,
        };

        info!(network = %name, nick = %state.nickname, "Registering");
        let registration = async {
            handle.nick(&state.nickname).await?;
            handle
                .send(&IrcMessage::user(&self.settings.nickname, &self.settings.realname))
                .await
        };
        if let Err(e) = registration.await {
            handle.close();
            return (SessionEnd::Closed(e.to_string()), false);
        }

        let end = loop {
            tokio::select! {
                biased;

                _ = shutdown_requested(shutdown) => {
                    info!(network = %name, "Sending QUIT");
                    let _ = handle.quit(QUIT_MESSAGE).await;
                    handle.close();
                    let _ = tokio::time::timeout(QUIT_GRACE, async {
                        while let Some(event) = events.recv().await {
                            if matches!(event, TransportEvent::Closed { .. }) {
                                break;
                            }
                        }
                    })
                    .await;
                    break SessionEnd::Shutdown;
                }

                event = events.recv() => match event {
                    Some(TransportEvent::Line(line)) => {
                        self.handle_line(&line, &handle, &mut state).await;
                    }
                    Some(TransportEvent::Closed { reason }) => break SessionEnd::Closed(reason),
                    None => break SessionEnd::Closed("event stream ended".to_string()),
                },
            }
        };

        handle.close();
        (end, state.registered)
    }

    /// Applies lifecycle rules to one received line, then dispatches it.
    async fn handle_line(&self, line: &str, handle: &ConnectionHandle, state: &mut SessionState) {
        let name = self.settings.name.as_str();
        let message = match IrcMessage::parse(line) {
            Ok(message) => message,
            Err(e) => {
                debug!(network = %name, error = %e, "Dropping unparseable line");
                return;
            }
        };

        match message.command.as_str() {
            RPL_WELCOME => {
                if let Some(nick) = message.param(0) {
                    state.nickname = nick.to_string();
                }
                state.registered = true;
                self.registry.set_state(name, ConnectionState::Registered);
                self.registry.set_nickname(name, &state.nickname);
                info!(network = %name, nick = %state.nickname, "Registered");

                for channel in &self.settings.channels {
                    info!(network = %name, channel = %channel, "Joining");
                    if let Err(e) = handle.join(channel).await {
                        warn!(network = %name, channel = %channel, error = %e, "Join failed");
                    }
                }
            }
            ERR_NICKNAMEINUSE => {
                if state.tried_alternate {
                    warn!(
                        network = %name,
                        nick = %state.nickname,
                        "Alternate nickname also in use, waiting for the server"
                    );
                    return;
                }
                let alternate = format!("{}{}", self.settings.nickname, NICK_SUFFIX);
                warn!(network = %name, nick = %alternate, "Nickname in use, retrying with suffix");
                if let Err(e) = handle.nick(&alternate).await {
                    warn!(network = %name, error = %e, "Failed to send NICK");
                }
                state.nickname = alternate;
                state.tried_alternate = true;
            }
            "KICK" => {
                let (Some(channel), Some(kicked)) = (message.param(0), message.param(1)) else {
                    return;
                };
                if kicked.eq_ignore_ascii_case(&state.nickname) {
                    warn!(
                        network = %name,
                        channel = %channel,
                        by = message.source_nick().unwrap_or_default(),
                        "Kicked, rejoining"
                    );
                    if let Err(e) = handle.join(channel).await {
                        warn!(network = %name, channel = %channel, error = %e, "Rejoin failed");
                    }
                }
            }
            "INVITE" => {
                info!(
                    network = %name,
                    channel = message.trailing().unwrap_or_default(),
                    by = message.source_nick().unwrap_or_default(),
                    "Invited, not joining"
                );
            }
            "JOIN" => {
                if self.is_self(&message, state) {
                    self.registry.set_state(name, ConnectionState::Joined);
                    info!(network = %name, channel = message.param(0).unwrap_or_default(), "Joined");
                }
            }
            "NICK" => {
                if self.is_self(&message, state)
                    && let Some(nick) = message.param(0)
                {
                    info!(network = %name, from = %state.nickname, to = %nick, "Nickname changed");
                    state.nickname = nick.to_string();
                    self.registry.set_nickname(name, nick);
                }
            }
            "ERROR" => {
                warn!(network = %name, reason = message.trailing().unwrap_or_default(), "Server error");
            }
            _ => {}
        }

        let intent = classify(&message, &self.rules);
        // Backend tasks run detached; their results only surface as replies
        let _ = self.router.dispatch(intent, handle).await;
    }

    fn is_self(&self, message: &IrcMessage, state: &SessionState) -> bool {
        message
            .source_nick()
            .is_some_and(|nick| nick.eq_ignore_ascii_case(&state.nickname))
    }
}

impl std::fmt::Debug for NetworkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkManager")
            .field("settings", &self.settings)
            .field("router", &self.router)
            .finish()
    }
}

/// Resolves once shutdown is signalled. Never resolves if the sender is gone
/// without signalling.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use relay_core::{
        CommandRequest, GatewayCapability, GatewayResult, LinkRequest, TransportError,
        TransportResult,
    };
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;
    use tokio::time::Instant;

    /// The far end of an accepted mock connection.
    struct Server {
        lines: mpsc::Receiver<String>,
        events: mpsc::Sender<TransportEvent>,
    }

    impl Server {
        async fn expect(&mut self, line: &str) {
            assert_eq!(self.lines.recv().await.as_deref(), Some(line));
        }

        async fn send(&self, line: &str) {
            self.events
                .send(TransportEvent::Line(line.to_string()))
                .await
                .unwrap();
        }

        async fn register(&mut self) {
            self.expect("NICK relay").await;
            self.expect("USER relay 0 * :Relay Bot").await;
            self.send(":irc.test 001 relay :Welcome").await;
            self.expect("JOIN #rust").await;
            self.expect("JOIN #relay").await;
        }
    }

    #[derive(Clone, Copy)]
    enum Outcome {
        Accept,
        Refuse,
    }

    struct MockConnector {
        script: Mutex<VecDeque<Outcome>>,
        attempts: Mutex<Vec<Instant>>,
        servers: mpsc::UnboundedSender<Server>,
    }

    #[async_trait]
    impl IrcClientCapability for MockConnector {
        async fn connect(&self, network: &str, config: &ClientConfig) -> TransportResult<Session> {
            self.attempts.lock().push(Instant::now());
            let outcome = self.script.lock().pop_front().unwrap_or(Outcome::Refuse);
            match outcome {
                Outcome::Refuse => Err(TransportError::ConnectionFailed {
                    addr: config.addr(),
                    reason: "refused".into(),
                }),
                Outcome::Accept => {
                    let (line_tx, line_rx) = mpsc::channel(64);
                    let (event_tx, event_rx) = mpsc::channel(64);
                    let (shutdown_tx, _) = watch::channel(false);
                    let _ = self.servers.send(Server {
                        lines: line_rx,
                        events: event_tx,
                    });
                    Ok(Session {
                        handle: ConnectionHandle::new(network, line_tx, shutdown_tx),
                        events: event_rx,
                    })
                }
            }
        }
    }

    struct EchoGateway;

    #[async_trait]
    impl GatewayCapability for EchoGateway {
        async fn run_command(&self, request: &CommandRequest) -> GatewayResult<String> {
            Ok(format!("{} {}", request.command, request.args).trim().to_string())
        }

        async fn fetch_title(&self, request: &LinkRequest) -> GatewayResult<String> {
            Ok(format!("page at {}", request.url))
        }
    }

    struct Harness {
        connector: Arc<MockConnector>,
        servers: mpsc::UnboundedReceiver<Server>,
        registry: NetworkRegistry,
        shutdown: watch::Sender<bool>,
        task: JoinHandle<()>,
    }

    fn settings() -> NetworkSettings {
        NetworkSettings {
            name: "test".into(),
            nickname: "relay".into(),
            realname: "Relay Bot".into(),
            client: ClientConfig::new("irc.test", 6667),
            channels: vec!["#rust".into(), "#relay".into()],
            retry: RetryConfig::default(),
        }
    }

    fn start(script: &[Outcome]) -> Harness {
        let (server_tx, servers) = mpsc::unbounded_channel();
        let connector = Arc::new(MockConnector {
            script: Mutex::new(script.iter().copied().collect()),
            attempts: Mutex::new(Vec::new()),
            servers: server_tx,
        });
        let registry = NetworkRegistry::new();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let manager = NetworkManager::new(
            settings(),
            connector.clone(),
            Router::new(Arc::new(EchoGateway), "relay 0.1.0"),
            Arc::new(ClassifierRules::default()),
            registry.clone(),
            shutdown_rx,
        );
        Harness {
            connector,
            servers,
            registry,
            shutdown,
            task: tokio::spawn(manager.run()),
        }
    }

    fn gaps(attempts: &[Instant]) -> Vec<Duration> {
        attempts.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles_until_connected() {
        let mut h = start(&[Outcome::Refuse, Outcome::Refuse, Outcome::Refuse, Outcome::Accept]);
        let mut server = h.servers.recv().await.unwrap();
        server.register().await;

        assert_eq!(
            gaps(&h.connector.attempts.lock()),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
        let status = h.registry.status("test").unwrap();
        assert_eq!(status.connect_attempts, 4);
        assert_eq!(status.state, ConnectionState::Registered);
        assert_eq!(status.nickname.as_deref(), Some("relay"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_resets_after_registered_session() {
        let mut h = start(&[
            Outcome::Refuse,
            Outcome::Refuse,
            Outcome::Accept,
            Outcome::Refuse,
            Outcome::Accept,
        ]);
        let mut server = h.servers.recv().await.unwrap();
        server.register().await;
        server
            .events
            .send(TransportEvent::Closed {
                reason: "reset by peer".into(),
            })
            .await
            .unwrap();

        let mut second = h.servers.recv().await.unwrap();
        second.expect("NICK relay").await;

        // 1s, 2s to first session; immediate retry; then 1s again, not 4s
        assert_eq!(
            gaps(&h.connector.attempts.lock()),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::ZERO,
                Duration::from_secs(1)
            ]
        );
        assert_eq!(h.registry.status("test").unwrap().reconnects, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_before_welcome_keeps_backing_off() {
        let mut h = start(&[Outcome::Refuse, Outcome::Accept, Outcome::Accept]);
        let server = h.servers.recv().await.unwrap();
        drop(server);

        let _second = h.servers.recv().await.unwrap();
        assert_eq!(
            gaps(&h.connector.attempts.lock()),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_is_answered() {
        let mut h = start(&[Outcome::Accept]);
        let mut server = h.servers.recv().await.unwrap();
        server.register().await;

        server.send("PING :abc123").await;
        server.expect("PONG abc123").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_nickname_collision_appends_suffix_once() {
        let mut h = start(&[Outcome::Accept]);
        let mut server = h.servers.recv().await.unwrap();
        server.expect("NICK relay").await;
        server.expect("USER relay 0 * :Relay Bot").await;

        server.send(":irc.test 433 * relay :Nickname is already in use").await;
        server.expect("NICK relay_").await;

        // Further collisions are not answered with another NICK
        for _ in 0..10 {
            server.send(":irc.test 433 * relay_ :Nickname is already in use").await;
        }
        server.send("PING :after-collisions").await;
        server.expect("PONG after-collisions").await;

        server.send(":irc.test 001 relay_ :Welcome").await;
        server.expect("JOIN #rust").await;
        server.expect("JOIN #relay").await;
        assert_eq!(
            h.registry.status("test").unwrap().nickname.as_deref(),
            Some("relay_")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_kick_rejoins_only_for_self() {
        let mut h = start(&[Outcome::Accept]);
        let mut server = h.servers.recv().await.unwrap();
        server.register().await;

        server.send(":op!o@h KICK #rust someoneelse :bye").await;
        server.send(":op!o@h KICK #rust relay :bye").await;
        server.expect("JOIN #rust").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_invite_is_not_followed() {
        let mut h = start(&[Outcome::Accept]);
        let mut server = h.servers.recv().await.unwrap();
        server.register().await;

        server.send(":alice!a@h INVITE relay #elsewhere").await;
        server.send("PING :after").await;
        server.expect("PONG after").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_join_marks_joined() {
        let mut h = start(&[Outcome::Accept]);
        let mut server = h.servers.recv().await.unwrap();
        server.register().await;

        server.send(":relay!r@h JOIN #rust").await;
        server.send("PING :sync").await;
        server.expect("PONG sync").await;
        assert_eq!(
            h.registry.status("test").unwrap().state,
            ConnectionState::Joined
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_and_link_replies() {
        let mut h = start(&[Outcome::Accept]);
        let mut server = h.servers.recv().await.unwrap();
        server.register().await;

        server.send(":alice!a@h PRIVMSG #rust :.echo  hi   there").await;
        server.expect("PRIVMSG #rust :echo hi there").await;

        server.send(":alice!a@h PRIVMSG #rust :see https://example.com ok").await;
        server
            .expect("PRIVMSG #rust :Title: page at https://example.com")
            .await;

        server.send(":alice!a@h PRIVMSG relay :.ping").await;
        server.expect("PRIVMSG alice ping").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ctcp_version() {
        let mut h = start(&[Outcome::Accept]);
        let mut server = h.servers.recv().await.unwrap();
        server.register().await;

        server.send(":alice!a@h PRIVMSG relay :\x01VERSION\x01").await;
        server.expect("NOTICE alice :\x01VERSION relay 0.1.0\x01").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_sends_quit() {
        let mut h = start(&[Outcome::Accept]);
        let mut server = h.servers.recv().await.unwrap();
        server.register().await;

        h.shutdown.send_replace(true);
        server.expect("QUIT :Shutting down").await;
        (&mut h.task).await.unwrap();
        assert_eq!(
            h.registry.status("test").unwrap().state,
            ConnectionState::Disconnected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_backoff() {
        let h = start(&[]);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        h.shutdown.send_replace(true);
        h.task.await.unwrap();
        assert_eq!(h.connector.attempts.lock().len(), 2);
    }
}
