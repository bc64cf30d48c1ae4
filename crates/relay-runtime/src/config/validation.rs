//! Configuration validation.
//!
//! Every check here is fatal: the runtime refuses to start any network until
//! the whole configuration passes.

use std::collections::HashSet;

use tokio::sync::Semaphore;

use super::error::{ConfigError, ConfigResult};
use super::schema::{
    EndpointSettings, GatewaySettings, LogOutput, LoggingConfig, NetworkConfig, RelayConfig,
    RetrySettings,
};

/// Validates the entire configuration.
pub fn validate_config(config: &RelayConfig) -> ConfigResult<()> {
    validate_nickname(&config.nickname)?;
    validate_endpoint(&config.command_endpoint, "command_endpoint")?;
    validate_endpoint(&config.link_endpoint, "link_endpoint")?;
    if !config.quote_endpoint.is_empty() {
        validate_endpoint(&config.quote_endpoint, "quote_endpoint")?;
    }
    validate_networks(config)?;
    validate_retry_config(&config.retry)?;
    validate_gateway_config(&config.gateway)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_nickname(nickname: &str) -> ConfigResult<()> {
    if nickname.is_empty() {
        return Err(ConfigError::missing_field("nickname"));
    }
    if nickname.chars().any(char::is_whitespace) {
        return Err(ConfigError::validation("Nickname cannot contain whitespace"));
    }
    Ok(())
}

fn validate_endpoint(endpoint: &EndpointSettings, name: &str) -> ConfigResult<()> {
    if endpoint.endpoint.is_empty() {
        return Err(ConfigError::missing_field(format!("{name}.endpoint")));
    }
    validate_url(&endpoint.endpoint)?;
    if endpoint.api_key.is_empty() {
        return Err(ConfigError::missing_field(format!("{name}.api_key")));
    }
    Ok(())
}

fn validate_url(url: &str) -> ConfigResult<()> {
    let valid_schemes = ["http://", "https://"];
    if !valid_schemes.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid_url(
            url,
            format!("URL must start with one of: {valid_schemes:?}"),
        ));
    }
    if url.len() == url.find("://").map_or(0, |i| i + 3) {
        return Err(ConfigError::invalid_url(url, "URL has no host"));
    }
    Ok(())
}

fn validate_networks(config: &RelayConfig) -> ConfigResult<()> {
    if config.networks.is_empty() {
        return Err(ConfigError::validation("At least one network is required"));
    }

    let mut seen = HashSet::new();
    for (name, network) in &config.networks {
        if !seen.insert(name.to_lowercase()) {
            return Err(ConfigError::DuplicateNetwork(name.clone()));
        }
        validate_network(name, network)?;
    }
    Ok(())
}

fn validate_network(name: &str, network: &NetworkConfig) -> ConfigResult<()> {
    if name.trim().is_empty() {
        return Err(ConfigError::validation("Network name cannot be empty"));
    }
    if network.server.trim().is_empty() {
        return Err(ConfigError::missing_field(format!("networks.{name}.server")));
    }
    if network.port == Some(0) {
        return Err(ConfigError::InvalidPort {
            network: name.to_string(),
            port: 0,
        });
    }
    if network.normalized_channels().is_empty() {
        return Err(ConfigError::validation(format!(
            "No channels specified for network: {name}"
        )));
    }
    Ok(())
}

/// Validates retry configuration.
fn validate_retry_config(retry: &RetrySettings) -> ConfigResult<()> {
    if retry.initial_delay_ms == 0 {
        return Err(ConfigError::validation(
            "Initial retry delay must be greater than 0",
        ));
    }

    if retry.max_delay_ms < retry.initial_delay_ms {
        return Err(ConfigError::validation(
            "Max retry delay must be greater than or equal to initial delay",
        ));
    }

    if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
        return Err(ConfigError::validation(
            "Backoff multiplier must be at least 1.0",
        ));
    }

    Ok(())
}

fn validate_gateway_config(gateway: &GatewaySettings) -> ConfigResult<()> {
    if gateway.timeout_ms == 0 {
        return Err(ConfigError::validation("Timeout must be greater than 0"));
    }
    match gateway.max_concurrent_dispatches {
        Some(0) => {
            return Err(ConfigError::validation(
                "max_concurrent_dispatches must be greater than 0 when set",
            ));
        }
        Some(limit) if limit > Semaphore::MAX_PERMITS => {
            return Err(ConfigError::validation(format!(
                "max_concurrent_dispatches must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        _ => {}
    }
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    if logging.filters.keys().any(|module| module.trim().is_empty()) {
        return Err(ConfigError::validation("Log filter module cannot be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RelayConfig {
        serde_yaml::from_str(
            r#"
nickname: relaybot
networks:
  libera:
    server: irc.libera.chat
    usetls: true
    channels: ["rust"]
command_endpoint: { endpoint: "https://backend.example/command", api_key: "k1" }
link_endpoint: { endpoint: "https://backend.example/title", api_key: "k2" }
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_empty_config_fails() {
        assert!(matches!(
            validate_config(&RelayConfig::default()),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_nickname_rules() {
        let mut config = valid();
        config.nickname = "relay bot".into();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_endpoint_rules() {
        let mut config = valid();
        config.link_endpoint.endpoint = "ftp://backend.example".into();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidUrl { .. })
        ));

        let mut config = valid();
        config.command_endpoint.api_key.clear();
        match validate_config(&config) {
            Err(ConfigError::MissingField { field }) => assert_eq!(field, "command_endpoint.api_key"),
            other => panic!("expected missing field, got {other:?}"),
        }

        let mut config = valid();
        config.command_endpoint.endpoint = "https://".into();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_quote_endpoint_is_optional() {
        let mut config = valid();
        assert!(config.quote_endpoint.is_empty());
        assert!(validate_config(&config).is_ok());

        config.quote_endpoint.endpoint = "https://quotes.example/api".into();
        match validate_config(&config) {
            Err(ConfigError::MissingField { field }) => assert_eq!(field, "quote_endpoint.api_key"),
            other => panic!("expected missing field, got {other:?}"),
        }

        config.quote_endpoint.api_key = "k3".into();
        assert!(validate_config(&config).is_ok());

        config.quote_endpoint.endpoint = "quotes.example".into();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_network_rules() {
        let mut config = valid();
        config.networks.clear();
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config.networks.get_mut("libera").unwrap().channels.clear();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        let mut config = valid();
        config.networks.get_mut("libera").unwrap().port = Some(0);
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidPort { port: 0, .. })
        ));

        let mut config = valid();
        config.networks.get_mut("libera").unwrap().server.clear();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_duplicate_network_names() {
        let mut config = valid();
        let libera = config.networks["libera"].clone();
        config.networks.insert("Libera".into(), libera);
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::DuplicateNetwork(_))
        ));
    }

    #[test]
    fn test_retry_rules() {
        let mut config = valid();
        config.retry.initial_delay_ms = 0;
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config.retry.max_delay_ms = 10;
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config.retry.backoff_multiplier = 0.5;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_gateway_and_logging_rules() {
        let mut config = valid();
        config.gateway.max_concurrent_dispatches = Some(0);
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config.gateway.max_concurrent_dispatches = Some(Semaphore::MAX_PERMITS + 1);
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        let mut config = valid();
        config.gateway.max_concurrent_dispatches = Some(Semaphore::MAX_PERMITS);
        assert!(validate_config(&config).is_ok());

        let mut config = valid();
        config.gateway.timeout_ms = 0;
        assert!(validate_config(&config).is_err());

        let mut config = valid();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));
    }
}
