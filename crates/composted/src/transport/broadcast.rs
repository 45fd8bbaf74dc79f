//! Fire-and-forget fan-out to connected subscribers.

use std::io;
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use composte_config::SocketEndpoint;

use super::context::Registration;
use super::stream::write_frame;
use super::{ConnectionStream, SocketListener, TRANSPORT_TARGET, TransportSettings};

const ERROR_BACKOFF: Duration = Duration::from_millis(150);

type Subscribers = Arc<Mutex<Vec<ConnectionStream>>>;

fn lock(subscribers: &Subscribers) -> MutexGuard<'_, Vec<ConnectionStream>> {
    subscribers.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Publishing side of the broadcast channel.
///
/// A background thread accepts subscribers until the channel is dropped or
/// its context is terminated. Messages carry no history: a subscriber only
/// receives what is published after it has been registered.
#[derive(Debug)]
pub struct BroadcastChannel {
    registration: Registration,
    subscribers: Subscribers,
    shutdown: Arc<AtomicBool>,
    accept_thread: Option<thread::JoinHandle<()>>,
}

impl BroadcastChannel {
    pub(crate) fn start(
        listener: SocketListener,
        registration: Registration,
        settings: TransportSettings,
        terminated: Arc<AtomicBool>,
    ) -> Self {
        let subscribers = Subscribers::default();
        let shutdown = Arc::new(AtomicBool::new(false));
        let accept = AcceptLoop {
            listener,
            settings,
            subscribers: Arc::clone(&subscribers),
            shutdown: Arc::clone(&shutdown),
            terminated,
        };
        let accept_thread = thread::spawn(move || accept.run());
        Self {
            registration,
            subscribers,
            shutdown,
            accept_thread: Some(accept_thread),
        }
    }

    /// Endpoint subscribers connect to.
    #[must_use]
    pub fn endpoint(&self) -> &SocketEndpoint {
        self.registration.endpoint()
    }

    /// Writes `frame` to every registered subscriber.
    ///
    /// Subscribers whose write fails are dropped. Returns the number of
    /// subscribers that received the frame.
    pub fn publish(&self, frame: &[u8]) -> usize {
        let mut subscribers = lock(&self.subscribers);
        let before = subscribers.len();
        subscribers.retain_mut(|subscriber| match write_frame(subscriber, frame) {
            Ok(()) => true,
            Err(error) => {
                debug!(target: TRANSPORT_TARGET, %error, "dropping broadcast subscriber");
                false
            }
        });
        let reached = subscribers.len();
        debug!(
            target: TRANSPORT_TARGET,
            reached,
            dropped = before - reached,
            "broadcast published"
        );
        reached
    }

    /// Number of currently registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }
}

impl Drop for BroadcastChannel {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.accept_thread.take()
            && handle.join().is_err()
        {
            warn!(target: TRANSPORT_TARGET, "broadcast accept thread panicked");
        }
        lock(&self.subscribers).clear();
    }
}

struct AcceptLoop {
    listener: SocketListener,
    settings: TransportSettings,
    subscribers: Subscribers,
    shutdown: Arc<AtomicBool>,
    terminated: Arc<AtomicBool>,
}

impl AcceptLoop {
    fn running(&self) -> bool {
        !self.shutdown.load(Ordering::SeqCst) && !self.terminated.load(Ordering::SeqCst)
    }

    fn run(self) {
        info!(
            target: TRANSPORT_TARGET,
            endpoint = %self.listener.endpoint(),
            "broadcast channel accepting subscribers"
        );
        let mut last_error = None::<io::ErrorKind>;
        while self.running() {
            match self.listener.accept() {
                Ok(Some(stream)) => {
                    last_error = None;
                    self.register(stream);
                }
                Ok(None) => thread::sleep(self.settings.poll_backoff),
                Err(error) => {
                    let kind = error.kind();
                    if last_error != Some(kind) {
                        warn!(target: TRANSPORT_TARGET, %error, "broadcast accept error");
                    }
                    last_error = Some(kind);
                    thread::sleep(ERROR_BACKOFF);
                }
            }
        }
    }

    fn register(&self, stream: ConnectionStream) {
        if let Err(error) = stream.set_io_timeout(Some(self.settings.io_timeout)) {
            warn!(target: TRANSPORT_TARGET, %error, "failed to configure subscriber");
            return;
        }
        let mut subscribers = lock(&self.subscribers);
        subscribers.push(stream);
        debug!(
            target: TRANSPORT_TARGET,
            subscribers = subscribers.len(),
            "broadcast subscriber registered"
        );
    }
}
