//! Session loop tying the codec, both channels, and a handler together.
//!
//! Each iteration takes the serialization lock, checks the shutdown flag,
//! polls the request channel, and runs decrypt, preprocess, handle, and
//! encrypt before replying. At most one request is in that pipeline at any
//! instant. Every delivered request gets exactly one reply, whichever stage
//! fails.

mod pipeline;

use std::fmt;
use std::sync::{
    Mutex, MutexGuard,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use composte_config::SocketEndpoint;
use composte_protocol::Reply;

use crate::codec::{Codec, EncryptError};
use crate::transport::{BroadcastChannel, ChannelError, RequestChannel, TransportContext};

/// Tracing target for session events.
pub(crate) const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

/// Converts a decrypted request into the handler's input.
pub trait Preprocess: Send + Sync {
    /// Parsed request type.
    type Output;
    /// Parse failure type.
    type Error: fmt::Display;

    /// Parses one decrypted request.
    fn preprocess(&self, message: String) -> Result<Self::Output, Self::Error>;
}

/// Produces the reply for one preprocessed request.
pub trait Handler<I>: Send + Sync {
    /// Handling failure type.
    type Error: fmt::Display;

    /// Handles `input`, optionally broadcasting through `broadcaster`.
    fn handle(&self, broadcaster: &dyn Broadcaster, input: I) -> Result<Reply, Self::Error>;
}

/// Publishes plaintext messages to broadcast subscribers.
pub trait Broadcaster {
    /// Encrypts and publishes `message`, returning the subscribers reached.
    fn broadcast(&self, message: &str) -> Result<usize, BroadcastError>;
}

/// Errors raised when a broadcast cannot be published.
#[derive(Debug, Error)]
pub enum BroadcastError {
    /// The server has been stopped.
    #[error("server is stopped")]
    Stopped,
    /// The message could not be encrypted.
    #[error("failed to encrypt broadcast: {0}")]
    Encrypt(#[from] EncryptError),
}

/// Collaboration server owning one request channel and one broadcast
/// channel.
pub struct Server<C> {
    codec: C,
    poll_timeout: Duration,
    context: TransportContext,
    request_endpoint: SocketEndpoint,
    broadcast_endpoint: SocketEndpoint,
    shutdown: AtomicBool,
    session: Mutex<Option<RequestChannel>>,
    broadcast: Mutex<Option<BroadcastChannel>>,
}

fn lock_recovering<'a, T>(mutex: &'a Mutex<T>, name: &'static str) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        warn!(target: SESSION_TARGET, lock = name, "recovering poisoned lock");
        poisoned.into_inner()
    })
}

impl<C: Codec> Server<C> {
    /// Binds both channels through `context`.
    ///
    /// # Errors
    ///
    /// Fails when either endpoint cannot be bound exclusively.
    pub fn new(
        context: TransportContext,
        request: &SocketEndpoint,
        broadcast: &SocketEndpoint,
        codec: C,
        poll_timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let request_channel = context.request_channel(request)?;
        let broadcast_channel = context.broadcast_channel(broadcast)?;
        let request_endpoint = request_channel.endpoint().clone();
        let broadcast_endpoint = broadcast_channel.endpoint().clone();
        info!(
            target: SESSION_TARGET,
            request = %request_endpoint,
            broadcast = %broadcast_endpoint,
            "server channels bound"
        );
        Ok(Self {
            codec,
            poll_timeout,
            context,
            request_endpoint,
            broadcast_endpoint,
            shutdown: AtomicBool::new(false),
            session: Mutex::new(Some(request_channel)),
            broadcast: Mutex::new(Some(broadcast_channel)),
        })
    }

    /// Endpoint the request channel is bound to.
    #[must_use]
    pub fn request_endpoint(&self) -> &SocketEndpoint {
        &self.request_endpoint
    }

    /// Endpoint the broadcast channel is bound to.
    #[must_use]
    pub fn broadcast_endpoint(&self) -> &SocketEndpoint {
        &self.broadcast_endpoint
    }

    /// Reports whether [`Server::stop`] has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Number of broadcast subscribers currently connected.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock_recovering(&self.broadcast, "broadcast")
            .as_ref()
            .map_or(0, BroadcastChannel::subscriber_count)
    }

    /// Runs the session loop until [`Server::stop`] is called.
    pub fn serve<P, H>(&self, preprocess: &P, handler: &H)
    where
        P: Preprocess,
        H: Handler<P::Output>,
    {
        info!(
            target: SESSION_TARGET,
            poll_timeout_ms = self.poll_timeout.as_millis(),
            "session loop running"
        );
        loop {
            let mut session = lock_recovering(&self.session, "session");
            if self.is_stopped() {
                break;
            }
            let Some(channel) = session.as_mut() else {
                break;
            };
            let Some(delivery) = channel.poll(self.poll_timeout, &self.shutdown) else {
                continue;
            };
            let (payload, reply) = delivery.into_parts();
            let frame = pipeline::run(&self.codec, preprocess, handler, self, &payload);
            if let Err(error) = reply.send(&frame) {
                warn!(target: SESSION_TARGET, %error, "failed to deliver reply");
            }
        }
        info!(target: SESSION_TARGET, "session loop stopped");
    }

    /// Stops the server. Idempotent.
    ///
    /// Waits for the in-flight request to finish, then unbinds the request
    /// channel and the broadcast channel. Once this returns no further
    /// replies or broadcasts are sent.
    pub fn stop(&self) {
        // Raised before locking so a polling loop yields the lock promptly.
        let first = !self.shutdown.swap(true, Ordering::SeqCst);

        if let Some(channel) = lock_recovering(&self.session, "session").take() {
            info!(
                target: SESSION_TARGET,
                endpoint = %channel.endpoint(),
                "request channel unbound"
            );
        }
        if let Some(channel) = lock_recovering(&self.broadcast, "broadcast").take() {
            info!(
                target: SESSION_TARGET,
                endpoint = %channel.endpoint(),
                subscribers = channel.subscriber_count(),
                "broadcast channel unbound"
            );
        }
        self.context.terminate();

        if first {
            info!(target: SESSION_TARGET, "server stopped");
        }
    }
}

impl<C: Codec> Broadcaster for Server<C> {
    fn broadcast(&self, message: &str) -> Result<usize, BroadcastError> {
        if self.is_stopped() {
            debug!(target: SESSION_TARGET, "broadcast after stop ignored");
            return Err(BroadcastError::Stopped);
        }
        let frame = self.codec.encrypt(message)?;
        let guard = lock_recovering(&self.broadcast, "broadcast");
        let Some(channel) = guard.as_ref() else {
            debug!(target: SESSION_TARGET, "broadcast after stop ignored");
            return Err(BroadcastError::Stopped);
        };
        Ok(channel.publish(&frame))
    }
}

impl<C> fmt::Debug for Server<C> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Server")
            .field("request_endpoint", &self.request_endpoint)
            .field("broadcast_endpoint", &self.broadcast_endpoint)
            .field("poll_timeout", &self.poll_timeout)
            .field("stopped", &self.shutdown.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
