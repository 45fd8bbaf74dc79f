//! Termination signals that stop a running server.

use std::io;
use std::sync::Mutex;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::PROCESS_TARGET;

/// Signals that stop the server, with the names used in logs.
const STOP_SIGNALS: [(i32, &str); 4] = [
    (SIGTERM, "SIGTERM"),
    (SIGINT, "SIGINT"),
    (SIGQUIT, "SIGQUIT"),
    (SIGHUP, "SIGHUP"),
];

/// Something the launcher can block on until the server should stop.
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until shutdown should proceed.
    fn wait(&self) -> Result<(), ShutdownError>;
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The signal iterator ended without delivering a signal.
    #[error("signal delivery closed before a stop signal arrived")]
    Closed,
}

/// Listener for SIGTERM, SIGINT, SIGQUIT, and SIGHUP.
///
/// Handlers are registered by [`SystemShutdownSignal::install`], so signals
/// delivered before [`ShutdownSignal::wait`] runs are queued, not lost.
pub struct SystemShutdownSignal {
    signals: Mutex<Signals>,
}

impl SystemShutdownSignal {
    /// Registers handlers for every stop signal.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError::Install`] when registration fails.
    pub fn install() -> Result<Self, ShutdownError> {
        let signals = Signals::new(STOP_SIGNALS.map(|(signal, _)| signal))
            .map_err(|source| ShutdownError::Install { source })?;
        debug!(
            target: PROCESS_TARGET,
            signals = ?STOP_SIGNALS.map(|(_, name)| name),
            "stop signal handlers installed"
        );
        Ok(Self {
            signals: Mutex::new(signals),
        })
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let mut signals = self.signals.lock().unwrap_or_else(|poisoned| {
            warn!(target: PROCESS_TARGET, "recovering poisoned signal lock");
            poisoned.into_inner()
        });
        let signal = signals.forever().next().ok_or(ShutdownError::Closed)?;
        info!(
            target: PROCESS_TARGET,
            signal = signal_name(signal),
            "stop signal received"
        );
        Ok(())
    }
}

impl std::fmt::Debug for SystemShutdownSignal {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SystemShutdownSignal")
            .finish_non_exhaustive()
    }
}

/// Log name for a stop signal number.
fn signal_name(signal: i32) -> &'static str {
    STOP_SIGNALS
        .iter()
        .find_map(|&(number, name)| (number == signal).then_some(name))
        .unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(SIGTERM, "SIGTERM")]
    #[case(SIGINT, "SIGINT")]
    #[case(SIGQUIT, "SIGQUIT")]
    #[case(SIGHUP, "SIGHUP")]
    #[case(0, "unknown")]
    fn stop_signals_are_named(#[case] signal: i32, #[case] expected: &str) {
        assert_eq!(signal_name(signal), expected);
    }
}
