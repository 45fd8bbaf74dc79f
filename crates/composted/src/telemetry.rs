//! Structured logging for the server.
//!
//! One global subscriber per process, writing to stderr in the configured
//! [`LogFormat`]. Every module logs on its own `composted::<module>` target,
//! so `COMPOSTE_LOG_FILTER=composted::session=debug` narrows output to the
//! session loop.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, info, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use composte_config::{Config, LogFormat};

const TELEMETRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::telemetry");

/// Format of the subscriber installed by the first successful call.
static INSTALLED_FORMAT: OnceCell<LogFormat> = OnceCell::new();

/// Proof that the global subscriber is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    format: LogFormat,
}

impl TelemetryHandle {
    /// Format of the installed subscriber, which may differ from the
    /// configuration passed to a later [`initialise`] call.
    #[must_use]
    pub fn format(self) -> LogFormat {
        self.format
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Failed to install the tracing subscriber.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global tracing subscriber on first use.
///
/// Later calls leave the installed subscriber alone, even when their
/// configuration differs, and return a handle naming the installed format.
///
/// # Examples
///
/// ```rust
/// use composte_config::Config;
/// use composted::telemetry;
///
/// # fn main() -> Result<(), composted::TelemetryError> {
/// let config = Config::default();
/// let first = telemetry::initialise(&config)?;
/// let second = telemetry::initialise(&config)?;
/// assert_eq!(first.format(), second.format());
/// # Ok(())
/// # }
/// ```
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED_FORMAT
        .get_or_try_init(|| install(config))
        .map(|&format| TelemetryHandle { format })
}

fn install(config: &Config) -> Result<LogFormat, TelemetryError> {
    tracing::subscriber::set_global_default(subscriber(config)?)
        .map_err(TelemetryError::Subscriber)?;
    info!(
        target: TELEMETRY_TARGET,
        format = %config.log_format(),
        filter = config.log_filter(),
        "telemetry installed"
    );
    Ok(config.log_format())
}

fn subscriber(config: &Config) -> Result<Box<dyn Subscriber + Send + Sync>, TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(fmt::time::UtcTime::rfc_3339());
    Ok(match config.log_format() {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn config_with(format: LogFormat, filter: &str) -> Config {
        Config {
            log_filter: String::from(filter),
            log_format: format,
            ..Config::default()
        }
    }

    #[test]
    fn rejects_unparseable_filters_before_installing() {
        let config = config_with(LogFormat::Json, "composted=notalevel");
        let error = subscriber(&config).err().expect("filter should be rejected");
        assert!(matches!(error, TelemetryError::Filter(_)));
    }

    #[rstest]
    #[case(LogFormat::Json, "info")]
    #[case(LogFormat::Compact, "composted::session=debug,warn")]
    fn builds_a_subscriber_for_each_format(#[case] format: LogFormat, #[case] filter: &str) {
        assert!(subscriber(&config_with(format, filter)).is_ok());
    }

    #[test]
    fn later_calls_report_the_installed_format() {
        let first = initialise(&config_with(LogFormat::Compact, "info")).expect("install");
        let second = initialise(&config_with(LogFormat::Json, "info")).expect("reuse");
        assert_eq!(first.format(), second.format());
    }
}
