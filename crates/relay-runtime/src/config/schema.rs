//! Configuration schema definitions.
//!
//! Field names are snake_case. The keys used by older deployment files
//! (`lambdaCommand`, `lambdaTitle`, `addit`, `apiKey`, `usetls`) are accepted as
//! aliases.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use relay_core::{ClientConfig, EndpointConfig, normalize_channel};
use relay_framework::{ClassifierRules, DEFAULT_COMMAND_PREFIX, DEFAULT_IGNORED_NICK};

/// Port used when a plaintext network omits one.
pub const DEFAULT_PLAIN_PORT: u16 = 6667;

/// Port used when a TLS network omits one.
pub const DEFAULT_TLS_PORT: u16 = 6697;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Nickname used on every network.
    #[serde(default)]
    pub nickname: String,

    /// Real name sent at registration; defaults to the nickname.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realname: Option<String>,

    /// Identification string for CTCP VERSION replies.
    #[serde(default = "default_version_reply")]
    pub version_reply: String,

    /// Networks by name.
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,

    /// Backend endpoint for dot-prefixed commands.
    #[serde(
        default,
        alias = "lambdaCommand",
        skip_serializing_if = "EndpointSettings::is_empty"
    )]
    pub command_endpoint: EndpointSettings,

    /// Backend endpoint for link titles.
    #[serde(
        default,
        alias = "lambdaTitle",
        skip_serializing_if = "EndpointSettings::is_empty"
    )]
    pub link_endpoint: EndpointSettings,

    /// Optional quote service consulted for the `rexpl` command.
    #[serde(
        default,
        alias = "addit",
        skip_serializing_if = "EndpointSettings::is_empty"
    )]
    pub quote_endpoint: EndpointSettings,

    /// Reconnect backoff.
    #[serde(default)]
    pub retry: RetrySettings,

    /// Backend call settings.
    #[serde(default)]
    pub gateway: GatewaySettings,

    /// Message classification settings.
    #[serde(default)]
    pub classifier: ClassifierSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            nickname: String::new(),
            realname: None,
            version_reply: default_version_reply(),
            networks: BTreeMap::new(),
            command_endpoint: EndpointSettings::default(),
            link_endpoint: EndpointSettings::default(),
            quote_endpoint: EndpointSettings::default(),
            retry: RetrySettings::default(),
            gateway: GatewaySettings::default(),
            classifier: ClassifierSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Real name sent at registration.
    pub fn effective_realname(&self) -> &str {
        self.realname.as_deref().unwrap_or(&self.nickname)
    }
}

fn default_version_reply() -> String {
    format!("relay {}", env!("CARGO_PKG_VERSION"))
}

// =============================================================================
// Networks
// =============================================================================

/// One chat network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Server host name.
    #[serde(default)]
    pub server: String,

    /// Server port; see [`NetworkConfig::effective_port`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Connect with TLS.
    #[serde(default, alias = "usetls")]
    pub use_tls: bool,

    /// Accept self-signed or otherwise unverifiable certificates.
    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// Channels to join, with or without the leading `#`.
    #[serde(default)]
    pub channels: Vec<String>,
}

impl NetworkConfig {
    /// Port to connect to: the configured one, else 6697 for TLS and 6667
    /// for plaintext.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(if self.use_tls {
            DEFAULT_TLS_PORT
        } else {
            DEFAULT_PLAIN_PORT
        })
    }

    /// Channel names in canonical form, in configured order, without duplicates.
    pub fn normalized_channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let channel = normalize_channel(channel);
            if channel.len() > 1 && !channels.iter().any(|c| c.eq_ignore_ascii_case(&channel)) {
                channels.push(channel);
            }
        }
        channels
    }

    /// Transport settings for this network.
    pub fn to_client_config(&self) -> ClientConfig {
        let config = ClientConfig::new(self.server.clone(), self.effective_port());
        if self.use_tls {
            config.with_tls(self.accept_invalid_certs)
        } else {
            config
        }
    }
}

// =============================================================================
// Backend
// =============================================================================

/// A backend endpoint: URL plus pre-shared key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSettings {
    /// URL requests are POSTed to.
    #[serde(default, alias = "url", skip_serializing_if = "String::is_empty")]
    pub endpoint: String,

    /// Key sent in the `x-api-key` header.
    #[serde(default, alias = "apiKey", skip_serializing_if = "String::is_empty")]
    pub api_key: String,
}

impl EndpointSettings {
    /// True when neither field is set.
    pub fn is_empty(&self) -> bool {
        self.endpoint.is_empty() && self.api_key.is_empty()
    }

    /// Converts to the core endpoint descriptor.
    pub fn to_endpoint(&self) -> EndpointConfig {
        EndpointConfig::new(self.endpoint.clone(), self.api_key.clone())
    }
}

/// Backend call settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Upper bound on backend calls in flight; unbounded when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent_dispatches: Option<usize>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_concurrent_dispatches: None,
        }
    }
}

impl GatewaySettings {
    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    30000
}

// =============================================================================
// Retry
// =============================================================================

/// Reconnect backoff configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Delay after the first failed attempt in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay between attempts in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetrySettings {
    /// Converts to core retry config.
    pub fn to_core_retry(&self) -> relay_core::RetryConfig {
        relay_core::RetryConfig {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.backoff_multiplier,
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    300_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// =============================================================================
// Classifier
// =============================================================================

/// Message classification settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierSettings {
    /// Character that starts a command.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: char,

    /// Senders whose lines are never acted on.
    #[serde(default = "default_ignored_nicks")]
    pub ignored_nicks: Vec<String>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
            ignored_nicks: default_ignored_nicks(),
        }
    }
}

impl ClassifierSettings {
    /// Converts to classifier rules.
    pub fn to_rules(&self) -> ClassifierRules {
        ClassifierRules {
            command_prefix: self.command_prefix,
            ignored_nicks: self.ignored_nicks.clone(),
        }
    }
}

fn default_command_prefix() -> char {
    DEFAULT_COMMAND_PREFIX
}

fn default_ignored_nicks() -> Vec<String> {
    vec![DEFAULT_IGNORED_NICK.to_string()]
}

// =============================================================================
// Logging
// =============================================================================

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Everything, including keepalive traffic.
    Trace,
    /// Dispatch and protocol detail.
    Debug,
    /// Connection lifecycle.
    #[default]
    Info,
    /// Recoverable failures.
    Warn,
    /// Failures only.
    Error,
}

impl LogLevel {
    /// Returns the level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single-line, abbreviated.
    #[default]
    Compact,
    /// Single-line with all span context.
    Full,
    /// Multi-line, human oriented.
    Pretty,
    /// One JSON object per line (`json-log` feature).
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Standard output.
    #[default]
    Stdout,
    /// Standard error.
    Stderr,
    /// A file; see [`LoggingConfig::file_path`].
    File,
}

/// Log file rotation period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// One file forever.
    #[default]
    Never,
    /// New file every hour.
    Hourly,
    /// New file every day.
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    /// Span created.
    #[serde(default)]
    pub new: bool,
    /// Span entered.
    #[serde(default)]
    pub enter: bool,
    /// Span exited.
    #[serde(default)]
    pub exit: bool,
    /// Span closed.
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level; `RUST_LOG` wins when set.
    #[serde(default)]
    pub level: LogLevel,

    /// Line format.
    #[serde(default)]
    pub format: LogFormat,

    /// Destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Log file, required for file output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    /// File rotation.
    #[serde(default)]
    pub rotation: LogRotation,

    /// Include thread IDs.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Span lifecycle events.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Per-module levels, e.g. `relay_transport: trace`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = r##"
nickname: relaybot
networks:
  libera:
    server: irc.libera.chat
    usetls: true
    channels: ["rust", "#relay", "Rust"]
  local:
    server: localhost
    port: 6668
    channels: ["test"]
lambdaCommand:
  endpoint: https://backend.example/command
  apiKey: secret-1
lambdaTitle:
  endpoint: https://backend.example/title
  apiKey: secret-2
addit:
  endpoint: https://quotes.example/api
  apiKey: secret-3
"##;

    #[test]
    fn test_legacy_keys_are_accepted() {
        let config: RelayConfig = serde_yaml::from_str(LEGACY).unwrap();
        assert_eq!(config.nickname, "relaybot");
        assert_eq!(config.command_endpoint.api_key, "secret-1");
        assert_eq!(config.link_endpoint.endpoint, "https://backend.example/title");
        assert_eq!(config.quote_endpoint.endpoint, "https://quotes.example/api");
        assert_eq!(config.quote_endpoint.api_key, "secret-3");

        let libera = &config.networks["libera"];
        assert!(libera.use_tls);
        assert_eq!(libera.effective_port(), 6697);
        assert_eq!(config.networks["local"].effective_port(), 6668);
    }

    #[test]
    fn test_channels_are_normalized_and_deduplicated() {
        let config: RelayConfig = serde_yaml::from_str(LEGACY).unwrap();
        assert_eq!(
            config.networks["libera"].normalized_channels(),
            vec!["#rust", "#relay"]
        );
    }

    #[test]
    fn test_defaults() {
        let config: RelayConfig = serde_yaml::from_str("nickname: bot").unwrap();
        assert_eq!(config.retry.initial_delay_ms, 1000);
        assert_eq!(config.retry.max_delay_ms, 300_000);
        assert_eq!(config.gateway.timeout(), Duration::from_secs(30));
        assert_eq!(config.gateway.max_concurrent_dispatches, None);
        assert!(config.quote_endpoint.is_empty());
        assert_eq!(config.classifier.command_prefix, '.');
        assert_eq!(config.effective_realname(), "bot");
        assert!(config.version_reply.starts_with("relay "));
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_client_config_conversion() {
        let network = NetworkConfig {
            server: "irc.example.org".into(),
            port: None,
            use_tls: true,
            accept_invalid_certs: true,
            channels: vec![],
        };
        let client = network.to_client_config();
        assert_eq!(client.addr(), "irc.example.org:6697");
        assert!(client.use_tls);
        assert!(client.accept_invalid_certs);
    }

    #[test]
    fn test_logging_section() {
        let config: LoggingConfig = serde_yaml::from_str(
            "level: debug\nformat: pretty\noutput: file\nfile_path: /tmp/relay.log\nrotation: daily\nfilters:\n  relay_transport: trace\n",
        )
        .unwrap();
        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.rotation, LogRotation::Daily);
        assert_eq!(config.filters["relay_transport"], LogLevel::Trace);
    }
}
