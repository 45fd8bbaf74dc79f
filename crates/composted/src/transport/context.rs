//! Injectable owner of transport settings and channel lifecycles.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use tracing::{debug, info};

use composte_config::{Config, SocketEndpoint};

use super::{BroadcastChannel, ChannelError, RequestChannel, SocketListener, TRANSPORT_TARGET};

/// Default pause between accept attempts while a channel is idle.
const DEFAULT_POLL_BACKOFF: Duration = Duration::from_millis(25);
/// Largest request frame accepted, newline excluded.
const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

type BoundEndpoints = Arc<Mutex<Vec<SocketEndpoint>>>;

/// Keeps an endpoint listed by [`TransportContext::bound_endpoints`] for as
/// long as the channel holding it is alive.
#[derive(Debug)]
pub(crate) struct Registration {
    endpoint: SocketEndpoint,
    bound: BoundEndpoints,
}

impl Registration {
    pub(crate) fn endpoint(&self) -> &SocketEndpoint {
        &self.endpoint
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut bound = self.bound.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(index) = bound.iter().position(|endpoint| *endpoint == self.endpoint) {
            bound.remove(index);
        }
        debug!(target: TRANSPORT_TARGET, endpoint = %self.endpoint, "endpoint released");
    }
}

/// Settings shared by every channel created through one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSettings {
    /// Pause between accept attempts while idle.
    pub poll_backoff: Duration,
    /// Read and write timeout applied to accepted connections.
    pub io_timeout: Duration,
    /// Largest request frame accepted.
    pub max_frame_bytes: usize,
}

impl TransportSettings {
    /// Derives settings from the resolved configuration.
    ///
    /// Accepted connections get an IO timeout equal to the poll timeout so a
    /// silent client cannot hold the session for longer than one poll.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            io_timeout: config.poll_timeout(),
            ..Self::default()
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            poll_backoff: DEFAULT_POLL_BACKOFF,
            io_timeout: composte_config::default_poll_timeout(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Owns transport settings and the endpoints bound through it.
///
/// Terminating the context makes every channel it created stop accepting
/// connections and refuses new channels. There is no process-wide instance;
/// whoever builds the server owns the context.
#[derive(Debug)]
pub struct TransportContext {
    settings: TransportSettings,
    terminated: Arc<AtomicBool>,
    bound: BoundEndpoints,
}

impl TransportContext {
    /// Creates a live context.
    #[must_use]
    pub fn new(settings: TransportSettings) -> Self {
        Self {
            settings,
            terminated: Arc::new(AtomicBool::new(false)),
            bound: BoundEndpoints::default(),
        }
    }

    /// Settings applied to channels created by this context.
    #[must_use]
    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    /// Binds a request channel to `endpoint`.
    ///
    /// # Errors
    ///
    /// Fails when the context is terminated or the endpoint cannot be bound
    /// exclusively.
    pub fn request_channel(
        &self,
        endpoint: &SocketEndpoint,
    ) -> Result<RequestChannel, ChannelError> {
        let (listener, registration) = self.bind(endpoint)?;
        Ok(RequestChannel::new(
            listener,
            registration,
            self.settings,
            Arc::clone(&self.terminated),
        ))
    }

    /// Binds a broadcast channel to `endpoint` and starts accepting
    /// subscribers.
    ///
    /// # Errors
    ///
    /// Fails when the context is terminated or the endpoint cannot be bound
    /// exclusively.
    pub fn broadcast_channel(
        &self,
        endpoint: &SocketEndpoint,
    ) -> Result<BroadcastChannel, ChannelError> {
        let (listener, registration) = self.bind(endpoint)?;
        Ok(BroadcastChannel::start(
            listener,
            registration,
            self.settings,
            Arc::clone(&self.terminated),
        ))
    }

    /// Endpoints of the live channels created through this context, in
    /// binding order. A channel's endpoint is removed when it is dropped.
    #[must_use]
    pub fn bound_endpoints(&self) -> Vec<SocketEndpoint> {
        self.bound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stops every channel created through this context. Idempotent.
    pub fn terminate(&self) {
        if !self.terminated.swap(true, Ordering::SeqCst) {
            info!(target: TRANSPORT_TARGET, "transport context terminated");
        }
    }

    /// Reports whether [`TransportContext::terminate`] has run.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    fn bind(
        &self,
        endpoint: &SocketEndpoint,
    ) -> Result<(SocketListener, Registration), ChannelError> {
        if self.is_terminated() {
            return Err(ChannelError::ContextTerminated);
        }
        let listener = SocketListener::bind(endpoint)?;
        let resolved = listener.endpoint().clone();
        self.bound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(resolved.clone());
        let registration = Registration {
            endpoint: resolved,
            bound: Arc::clone(&self.bound),
        };
        Ok((listener, registration))
    }
}

impl Default for TransportContext {
    fn default() -> Self {
        Self::new(TransportSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_timeout_follows_poll_timeout() {
        let config = Config {
            poll_timeout_ms: 150,
            ..Config::default()
        };
        let settings = TransportSettings::from_config(&config);
        assert_eq!(settings.io_timeout, Duration::from_millis(150));
        assert_eq!(settings.max_frame_bytes, DEFAULT_MAX_FRAME_BYTES);
    }

    #[test]
    fn records_resolved_endpoints() {
        let context = TransportContext::default();
        let channel = context
            .request_channel(&SocketEndpoint::tcp("127.0.0.1", 0))
            .expect("bind request channel");
        assert_eq!(context.bound_endpoints(), vec![channel.endpoint().clone()]);
    }

    #[test]
    fn dropped_channels_are_no_longer_listed() {
        let context = TransportContext::default();
        let request = context
            .request_channel(&SocketEndpoint::tcp("127.0.0.1", 0))
            .expect("bind request channel");
        let broadcast = context
            .broadcast_channel(&SocketEndpoint::tcp("127.0.0.1", 0))
            .expect("bind broadcast channel");
        let broadcast_endpoint = broadcast.endpoint().clone();

        drop(request);
        assert_eq!(context.bound_endpoints(), vec![broadcast_endpoint]);
        drop(broadcast);
        assert!(context.bound_endpoints().is_empty());
    }

    #[test]
    fn terminated_contexts_refuse_new_channels() {
        let context = TransportContext::default();
        context.terminate();
        context.terminate();
        assert!(context.is_terminated());
        assert!(matches!(
            context.request_channel(&SocketEndpoint::tcp("127.0.0.1", 0)),
            Err(ChannelError::ContextTerminated)
        ));
    }
}
