//! Configuration for the relay runtime.
//!
//! Layered loading with figment, the schema, and fatal startup validation.

pub mod error;
pub mod legacy;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use legacy::CanonicalKeys;
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    ClassifierSettings, EndpointSettings, GatewaySettings, LogFormat, LogLevel, LogOutput,
    LogRotation, LoggingConfig, NetworkConfig, RelayConfig, RetrySettings, SpanEventConfig,
};
pub use validation::validate_config;
