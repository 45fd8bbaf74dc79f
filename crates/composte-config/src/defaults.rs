use std::time::Duration;

use crate::logging::LogFormat;
use crate::socket::SocketEndpoint;

/// Loopback host both channels bind to by default.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default TCP port for the request/reply channel.
pub const DEFAULT_REQUEST_PORT: u16 = 5555;

/// Default TCP port for the broadcast channel.
pub const DEFAULT_BROADCAST_PORT: u16 = 5556;

/// Default bounded wait for one poll of the request channel, in milliseconds.
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 2_000;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the binaries.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

/// Default logging format for the binaries.
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Endpoint the request/reply channel binds to when nothing overrides it.
pub fn default_request_socket() -> SocketEndpoint {
    SocketEndpoint::tcp(DEFAULT_HOST, DEFAULT_REQUEST_PORT)
}

/// Endpoint the broadcast channel binds to when nothing overrides it.
pub fn default_broadcast_socket() -> SocketEndpoint {
    SocketEndpoint::tcp(DEFAULT_HOST, DEFAULT_BROADCAST_PORT)
}

/// Raw poll timeout used by serde when the field is absent.
pub fn default_poll_timeout_ms() -> u64 {
    DEFAULT_POLL_TIMEOUT_MS
}

/// Poll timeout as a [`Duration`].
pub fn default_poll_timeout() -> Duration {
    Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS)
}
