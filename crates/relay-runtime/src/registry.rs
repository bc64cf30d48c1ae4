//! Per-network status registry.
//!
//! Each lifecycle manager reports into the registry; the runtime and tests read
//! snapshots out of it.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use relay_core::ConnectionState;

/// Observable status of one network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkStatus {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Nickname confirmed by the server, if registered.
    pub nickname: Option<String>,
    /// Connection attempts made, successful or not.
    pub connect_attempts: u64,
    /// Times an established session was lost and re-established.
    pub reconnects: u64,
}

/// Registry of network statuses, cheap to clone and share.
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    networks: Arc<RwLock<BTreeMap<String, NetworkStatus>>>,
}

impl NetworkRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a network in the `Disconnected` state; no-op if present.
    pub fn register(&self, network: &str) {
        self.networks
            .write()
            .entry(network.to_string())
            .or_default();
    }

    fn update(&self, network: &str, f: impl FnOnce(&mut NetworkStatus)) {
        let mut networks = self.networks.write();
        f(networks.entry(network.to_string()).or_default());
    }

    /// Sets the lifecycle state.
    pub fn set_state(&self, network: &str, state: ConnectionState) {
        self.update(network, |status| {
            status.state = state;
            if state == ConnectionState::Disconnected {
                status.nickname = None;
            }
        });
    }

    /// Records the confirmed nickname.
    pub fn set_nickname(&self, network: &str, nickname: &str) {
        self.update(network, |status| status.nickname = Some(nickname.to_string()));
    }

    /// Counts one connection attempt.
    pub fn record_attempt(&self, network: &str) {
        self.update(network, |status| status.connect_attempts += 1);
    }

    /// Counts one lost session.
    pub fn record_reconnect(&self, network: &str) {
        self.update(network, |status| status.reconnects += 1);
    }

    /// Returns the status of one network.
    pub fn status(&self, network: &str) -> Option<NetworkStatus> {
        self.networks.read().get(network).cloned()
    }

    /// Returns all statuses by network name.
    pub fn snapshot(&self) -> BTreeMap<String, NetworkStatus> {
        self.networks.read().clone()
    }

    /// Returns all network names.
    pub fn names(&self) -> Vec<String> {
        self.networks.read().keys().cloned().collect()
    }

    /// Returns statistics about the registry.
    pub fn stats(&self) -> RegistryStats {
        let networks = self.networks.read();
        let mut stats = RegistryStats {
            total: networks.len(),
            ..Default::default()
        };
        for status in networks.values() {
            match status.state {
                ConnectionState::Joined => stats.joined += 1,
                ConnectionState::Registered => stats.registered += 1,
                ConnectionState::Connecting => stats.connecting += 1,
                ConnectionState::Disconnected => stats.disconnected += 1,
            }
        }
        stats
    }
}

/// Statistics about the network registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Total number of networks.
    pub total: usize,
    /// Networks with at least one joined channel.
    pub joined: usize,
    /// Networks registered but not yet joined.
    pub registered: usize,
    /// Networks connecting or waiting to retry.
    pub connecting: usize,
    /// Networks without a session.
    pub disconnected: usize,
}

impl std::fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Networks: {} total ({} joined, {} registered, {} connecting, {} disconnected)",
            self.total, self.joined, self.registered, self.connecting, self.disconnected
        )
    }
}
