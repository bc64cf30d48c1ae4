//! Subscriber installation for the relay's `tracing` output.
//!
//! Everything is driven by the `logging` section of the configuration:
//!
//! ```rust,ignore
//! use relay_runtime::{config::load_config, logging};
//!
//! let config = load_config()?;
//! logging::init_from_config(&config.logging);
//! ```
//!
//! `RUST_LOG`, when set, replaces the configured base level. Per-module
//! `filters` are layered on top either way.

use std::ffi::OsStr;
use std::path::Path;

use tracing::warn;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogFormat, LogOutput, LogRotation, LoggingConfig, SpanEventConfig};

/// Installs the global subscriber. A subscriber that is already installed
/// is left in place.
pub fn init_from_config(config: &LoggingConfig) {
    let _ = try_init_from_config(config);
}

/// Installs the global subscriber, failing if one is already installed.
pub fn try_init_from_config(config: &LoggingConfig) -> Result<(), TryInitError> {
    let filter = env_filter(config);
    let spans = fmt_span(&config.span_events);
    let thread_ids = config.thread_ids;
    let location = config.file_location;

    macro_rules! install {
        (@layer $layer:expr, $writer:expr) => {
            tracing_subscriber::registry()
                .with(
                    $layer
                        .with_span_events(spans.clone())
                        .with_thread_ids(thread_ids)
                        .with_file(location)
                        .with_line_number(location)
                        .with_writer($writer),
                )
                .with(filter)
                .try_init()
        };
        ($writer:expr) => {
            match config.format {
                #[cfg(feature = "json-log")]
                LogFormat::Json => tracing_subscriber::registry()
                    .with(
                        fmt::layer()
                            .json()
                            .with_span_events(spans.clone())
                            .with_writer($writer),
                    )
                    .with(filter)
                    .try_init(),
                #[cfg(not(feature = "json-log"))]
                LogFormat::Json => {
                    eprintln!("JSON logging needs the json-log feature; using compact output");
                    install!(@layer fmt::layer().compact(), $writer)
                }
                LogFormat::Compact => install!(@layer fmt::layer().compact(), $writer),
                LogFormat::Full => install!(@layer fmt::layer(), $writer),
                LogFormat::Pretty => install!(@layer fmt::layer().pretty(), $writer),
            }
        };
    }

    match (config.output, &config.file_path) {
        (LogOutput::Stdout, _) => install!(std::io::stdout),
        (LogOutput::Stderr, _) => install!(std::io::stderr),
        (LogOutput::File, Some(path)) => install!(file_appender(path, config.rotation)),
        (LogOutput::File, None) => {
            let result = install!(std::io::stdout);
            warn!("Log output is file but no file_path is set; writing to stdout");
            result
        }
    }
}

/// `RUST_LOG` or the configured level, plus the per-module filters in name order.
fn env_filter(config: &LoggingConfig) -> EnvFilter {
    let mut filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    for directive in filter_directives(config) {
        match directive.parse() {
            Ok(d) => filter = filter.add_directive(d),
            Err(e) => eprintln!("Ignoring invalid log filter {directive:?}: {e}"),
        }
    }
    filter
}

fn filter_directives(config: &LoggingConfig) -> Vec<String> {
    let mut filters: Vec<_> = config.filters.iter().collect();
    filters.sort_by(|a, b| a.0.cmp(b.0));
    filters
        .into_iter()
        .map(|(module, level)| format!("{module}={}", level.as_str()))
        .collect()
}

fn fmt_span(events: &SpanEventConfig) -> FmtSpan {
    let mut span = FmtSpan::NONE;
    for (enabled, flag) in [
        (events.new, FmtSpan::NEW),
        (events.enter, FmtSpan::ENTER),
        (events.exit, FmtSpan::EXIT),
        (events.close, FmtSpan::CLOSE),
    ] {
        if enabled {
            span |= flag;
        }
    }
    span
}

fn file_appender(path: &Path, rotation: LogRotation) -> RollingFileAppender {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let name = path.file_name().unwrap_or_else(|| OsStr::new("relay.log"));
    match rotation {
        LogRotation::Never => tracing_appender::rolling::never(dir, name),
        LogRotation::Hourly => tracing_appender::rolling::hourly(dir, name),
        LogRotation::Daily => tracing_appender::rolling::daily(dir, name),
    }
}
