//! Main runtime orchestration.
//!
//! The runtime owns the configuration and a [`TransportContext`], spawns one
//! [`NetworkManager`] per configured network and stops them all on a signal.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use relay_runtime::RelayRuntime;
//!
//! // Loads relay.yaml from the current directory, env overrides on top
//! let runtime = RelayRuntime::builder().build()?;
//! runtime.run().await?;
//!
//! // Custom configuration path
//! let runtime = RelayRuntime::builder()
//!     .config_file("config/relay.yaml")
//!     .profile("production")
//!     .build()?;
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use relay_core::TransportContext;
use relay_framework::Router;
use relay_transport::{HttpGateway, IrcClientCapabilityImpl};

use crate::config::{ConfigLoader, RelayConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::network::{NetworkManager, NetworkSettings};
use crate::registry::NetworkRegistry;

/// Runs every configured network until shutdown.
pub struct RelayRuntime {
    /// The configuration.
    config: RelayConfig,
    /// Transport capabilities.
    transport_context: TransportContext,
    /// Per-network status.
    registry: NetworkRegistry,
    /// Set to `true` to stop every network.
    shutdown: Arc<watch::Sender<bool>>,
}

impl RelayRuntime {
    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime with explicit capabilities.
    ///
    /// The configuration is used as given; call [`validate_config`] first if
    /// it did not come through [`from_config`](Self::from_config).
    pub fn new(config: RelayConfig, transport_context: TransportContext) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            transport_context,
            registry: NetworkRegistry::new(),
            shutdown: Arc::new(shutdown),
        }
    }

    /// Validates the configuration, initializes logging and creates the
    /// default transport capabilities.
    pub fn from_config(config: &RelayConfig) -> RuntimeResult<Self> {
        validate_config(config)?;

        // try_init won't panic if already initialized
        logging::init_from_config(&config.logging);

        let transport_context = Self::create_default_transport_context(config)?;

        info!(
            log_level = %config.logging.level,
            log_format = ?config.logging.format,
            networks = config.networks.len(),
            "Runtime initialized from configuration"
        );

        Ok(Self::new(config.clone(), transport_context))
    }

    /// Builds the TCP/TLS client and the HTTP gateway from configuration.
    fn create_default_transport_context(config: &RelayConfig) -> RuntimeResult<TransportContext> {
        let mut gateway = HttpGateway::new(
            config.command_endpoint.to_endpoint(),
            config.link_endpoint.to_endpoint(),
            config.gateway.timeout(),
        )?;
        if !config.quote_endpoint.is_empty() {
            gateway = gateway.with_quote_endpoint(config.quote_endpoint.to_endpoint());
        }
        debug!("Registered gateway capability");

        Ok(TransportContext::new()
            .with_irc_client(Arc::new(IrcClientCapabilityImpl::new()))
            .with_gateway(Arc::new(gateway)))
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Returns the network status registry.
    pub fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }

    /// Signals every network to quit. Safe to call more than once.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run(&self) -> RuntimeResult<()> {
        info!("Relay is now running. Press Ctrl+C to stop.");
        self.run_until(wait_for_signal()).await
    }

    /// Runs until `stop` resolves or [`shutdown`](Self::shutdown) is called.
    pub async fn run_until<F>(&self, stop: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let managers = self.build_managers()?;
        let tasks: Vec<_> = managers
            .into_iter()
            .map(|manager| {
                info!(network = manager.name(), "Starting network");
                tokio::spawn(manager.run())
            })
            .collect();

        let mut all = Box::pin(join_all(tasks));
        tokio::select! {
            results = &mut all => {
                log_task_results(results);
                return Ok(());
            }
            _ = stop => {}
            _ = wait_shutdown(self.shutdown.subscribe()) => {}
        }

        info!("Stopping relay");
        self.shutdown();
        log_task_results(all.await);
        info!(stats = %self.registry.stats(), "Relay stopped");

        Ok(())
    }

    fn build_managers(&self) -> RuntimeResult<Vec<NetworkManager>> {
        if self.config.networks.is_empty() {
            return Err(RuntimeError::NoNetworks);
        }
        let client = self
            .transport_context
            .irc_client()
            .ok_or(RuntimeError::MissingCapability("irc client"))?;
        let gateway = self
            .transport_context
            .gateway()
            .ok_or(RuntimeError::MissingCapability("gateway"))?;

        let mut router = Router::new(gateway, self.config.version_reply.as_str());
        if let Some(limit) = self.config.gateway.max_concurrent_dispatches {
            router = router.with_max_concurrent(limit);
        }
        let rules = Arc::new(self.config.classifier.to_rules());

        Ok(self
            .config
            .networks
            .keys()
            .filter_map(|name| NetworkSettings::from_config(&self.config, name))
            .map(|settings| {
                NetworkManager::new(
                    settings,
                    client.clone(),
                    router.clone(),
                    rules.clone(),
                    self.registry.clone(),
                    self.shutdown.subscribe(),
                )
            })
            .collect())
    }
}

impl std::fmt::Debug for RelayRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayRuntime")
            .field("networks", &self.config.networks.keys().collect::<Vec<_>>())
            .field("transport_context", &self.transport_context)
            .finish()
    }
}

fn log_task_results(results: Vec<Result<(), tokio::task::JoinError>>) {
    for result in results {
        if let Err(e) = result {
            warn!(error = %e, "Network task ended abnormally");
        }
    }
}

async fn wait_shutdown(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Waits for shutdown signals (Ctrl+C or SIGTERM).
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => {
                        info!("Received Ctrl+C, shutting down");
                    }
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for Ctrl+C, running until stopped");
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating a [`RelayRuntime`] from layered configuration.
///
/// # Example
///
/// ```rust,ignore
/// let runtime = RelayRuntime::builder()
///     .config_file("config/production.yaml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder searching the current directory.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Also searches the per-user configuration directory.
    pub fn with_user_config_dir(mut self) -> Self {
        self.config_loader = self.config_loader.with_user_config_dir();
        self
    }

    /// Enables loading environment variables (enabled by default).
    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: RelayConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Loads and validates the configuration without building a runtime.
    pub fn load_config(self) -> RuntimeResult<RelayConfig> {
        let config = self.config_loader.load()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Builds the runtime.
    pub fn build(self) -> RuntimeResult<RelayRuntime> {
        let config = self.config_loader.load()?;
        RelayRuntime::from_config(&config)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use relay_core::{
        ClientConfig, CommandRequest, GatewayCapability, GatewayResult, IrcClientCapability,
        LinkRequest, Session, TransportError, TransportResult,
    };

    use crate::config::NetworkConfig;

    #[derive(Default)]
    struct Unreachable {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl IrcClientCapability for Unreachable {
        async fn connect(&self, _network: &str, config: &ClientConfig) -> TransportResult<Session> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::ConnectionFailed {
                addr: config.addr(),
                reason: "unreachable".into(),
            })
        }
    }

    struct Silent;

    #[async_trait]
    impl GatewayCapability for Silent {
        async fn run_command(&self, _request: &CommandRequest) -> GatewayResult<String> {
            Ok(String::new())
        }

        async fn fetch_title(&self, _request: &LinkRequest) -> GatewayResult<String> {
            Ok(String::new())
        }
    }

    fn config(networks: &[&str]) -> RelayConfig {
        let mut config = RelayConfig {
            nickname: "relay".into(),
            ..Default::default()
        };
        for name in networks {
            config.networks.insert(
                name.to_string(),
                NetworkConfig {
                    server: format!("irc.{name}.test"),
                    channels: vec!["rust".into()],
                    ..Default::default()
                },
            );
        }
        config
    }

    fn context(client: Arc<Unreachable>) -> TransportContext {
        TransportContext::new()
            .with_irc_client(client)
            .with_gateway(Arc::new(Silent))
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_stops_all_networks() {
        let client = Arc::new(Unreachable::default());
        let runtime = RelayRuntime::new(config(&["libera", "oftc"]), context(client.clone()));

        runtime
            .run_until(tokio::time::sleep(Duration::from_millis(1500)))
            .await
            .unwrap();

        // Two attempts each: at 0s and after the 1s backoff
        assert_eq!(client.attempts.load(Ordering::SeqCst), 4);
        let stats = runtime.registry().stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.disconnected, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_handle_stops_run() {
        let client = Arc::new(Unreachable::default());
        let runtime = Arc::new(RelayRuntime::new(config(&["libera"]), context(client)));

        let stopper = runtime.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            stopper.shutdown();
        });

        runtime.run_until(std::future::pending()).await.unwrap();
        assert!(runtime.registry().status("libera").is_some());
    }

    #[tokio::test]
    async fn test_no_networks_is_an_error() {
        let runtime = RelayRuntime::new(config(&[]), context(Arc::new(Unreachable::default())));
        assert!(matches!(
            runtime.run_until(async {}).await,
            Err(RuntimeError::NoNetworks)
        ));
    }

    #[tokio::test]
    async fn test_missing_gateway_is_an_error() {
        let ctx = TransportContext::new().with_irc_client(Arc::new(Unreachable::default()));
        let runtime = RelayRuntime::new(config(&["libera"]), ctx);
        assert!(matches!(
            runtime.run_until(async {}).await,
            Err(RuntimeError::MissingCapability("gateway"))
        ));
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        assert!(matches!(
            RelayRuntime::from_config(&RelayConfig::default()),
            Err(RuntimeError::Config(_))
        ));
    }
}
