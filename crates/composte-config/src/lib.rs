//! Layered configuration for the Composte collaboration server.
//!
//! Values resolve from built-in defaults, then an optional configuration file
//! (`--config-path` or `COMPOSTE_CONFIG_PATH`), then `COMPOSTE_*` environment
//! variables, and finally command-line flags. Each later layer overrides the
//! ones before it.

mod defaults;
mod logging;
mod socket;

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_BROADCAST_PORT, DEFAULT_HOST, DEFAULT_LOG_FILTER, DEFAULT_POLL_TIMEOUT_MS,
    DEFAULT_REQUEST_PORT, default_broadcast_socket, default_log_filter,
    default_log_filter_string, default_log_format, default_poll_timeout,
    default_poll_timeout_ms, default_request_socket,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Resolved server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "COMPOSTE")]
pub struct Config {
    /// Endpoint for the request/reply channel.
    #[serde(default = "defaults::default_request_socket")]
    pub request_socket: SocketEndpoint,
    /// Endpoint for the broadcast channel.
    #[serde(default = "defaults::default_broadcast_socket")]
    pub broadcast_socket: SocketEndpoint,
    /// Bounded wait for one poll of the request channel, in milliseconds.
    #[serde(default = "defaults::default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    /// Tracing filter expression.
    #[serde(default = "defaults::default_log_filter_string")]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
}

impl Config {
    /// Endpoint the request/reply channel binds to.
    #[must_use]
    pub fn request_socket(&self) -> &SocketEndpoint {
        &self.request_socket
    }

    /// Endpoint the broadcast channel binds to.
    #[must_use]
    pub fn broadcast_socket(&self) -> &SocketEndpoint {
        &self.broadcast_socket
    }

    /// Bounded wait for one poll of the request channel.
    ///
    /// A zero value is raised to one millisecond so the session loop never
    /// spins without yielding.
    #[must_use]
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms.max(1))
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_socket: default_request_socket(),
            broadcast_socket: default_broadcast_socket(),
            poll_timeout_ms: default_poll_timeout_ms(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}
