//! Request/reply channel enforcing one reply per delivered request.
//!
//! [`RequestChannel::poll`] hands out at most one [`Delivery`] at a time: the
//! delivery and its [`ReplyHandle`] mutably borrow the channel, so the next
//! poll cannot start while a reply is owed. Sending consumes the handle, and a
//! handle dropped unsent answers with a fallback failure reply.

use std::io;
use std::marker::PhantomData;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use composte_config::SocketEndpoint;
use composte_protocol::{INTERNAL_SERVER_ERROR, Reply};

use super::stream::{FrameError, read_frame, write_frame};
use super::context::Registration;
use super::{ChannelError, ConnectionStream, SocketListener, TRANSPORT_TARGET, TransportSettings};

/// Server side of the request/reply channel.
#[derive(Debug)]
pub struct RequestChannel {
    listener: SocketListener,
    registration: Registration,
    settings: TransportSettings,
    terminated: Arc<AtomicBool>,
}

impl RequestChannel {
    pub(crate) fn new(
        listener: SocketListener,
        registration: Registration,
        settings: TransportSettings,
        terminated: Arc<AtomicBool>,
    ) -> Self {
        Self {
            listener,
            registration,
            settings,
            terminated,
        }
    }

    /// Endpoint the channel is bound to.
    #[must_use]
    pub fn endpoint(&self) -> &SocketEndpoint {
        self.registration.endpoint()
    }

    /// Waits up to `timeout` for one request.
    ///
    /// Returns `None` when the wait expires, when `cancel` is raised, or when
    /// the owning context is terminated. Connections that close, stall, or
    /// misbehave before sending a complete line are logged and dropped without
    /// producing a delivery.
    pub fn poll(&mut self, timeout: Duration, cancel: &AtomicBool) -> Option<Delivery<'_>> {
        let deadline = Instant::now() + timeout;
        let mut last_error = None::<io::ErrorKind>;
        loop {
            if cancel.load(Ordering::SeqCst) || self.terminated.load(Ordering::SeqCst) {
                return None;
            }
            match self.listener.accept() {
                Ok(Some(stream)) => {
                    if let Some((payload, stream)) = self.receive(stream) {
                        return Some(Delivery::new(payload, stream));
                    }
                    continue;
                }
                Ok(None) => {}
                Err(error) => {
                    let kind = error.kind();
                    if last_error != Some(kind) {
                        warn!(target: TRANSPORT_TARGET, %error, "request accept error");
                    }
                    last_error = Some(kind);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            thread::sleep(self.settings.poll_backoff.min(deadline - now));
        }
    }

    fn receive(&self, mut stream: ConnectionStream) -> Option<(Vec<u8>, ConnectionStream)> {
        if let Err(error) = stream.set_io_timeout(Some(self.settings.io_timeout)) {
            warn!(target: TRANSPORT_TARGET, %error, "failed to configure connection");
            return None;
        }
        match read_frame(&mut stream, self.settings.max_frame_bytes) {
            Ok(Some(payload)) => Some((payload, stream)),
            Ok(None) => {
                debug!(target: TRANSPORT_TARGET, "client closed without a request");
                None
            }
            Err(FrameError::TooLarge { max }) => {
                warn!(target: TRANSPORT_TARGET, max_bytes = max, "request frame too large");
                // The client sent a request, so it is still owed an answer.
                drop(ReplyHandle::new(stream));
                None
            }
            Err(FrameError::Escape { position }) => {
                warn!(target: TRANSPORT_TARGET, position, "request frame has an invalid escape");
                drop(ReplyHandle::new(stream));
                None
            }
            Err(FrameError::Io(error)) => {
                warn!(target: TRANSPORT_TARGET, %error, "failed to read request");
                None
            }
        }
    }
}

/// One received request and the obligation to answer it.
#[derive(Debug)]
pub struct Delivery<'a> {
    payload: Vec<u8>,
    reply: ReplyHandle<'a>,
}

impl Delivery<'_> {
    fn new(payload: Vec<u8>, stream: ConnectionStream) -> Self {
        Self {
            payload,
            reply: ReplyHandle::new(stream),
        }
    }

    /// Raw request frame, without its line terminator.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

impl<'a> Delivery<'a> {
    /// Splits the delivery into its payload and reply obligation.
    #[must_use]
    pub fn into_parts(self) -> (Vec<u8>, ReplyHandle<'a>) {
        (self.payload, self.reply)
    }
}

/// Obligation to send exactly one reply for a delivered request.
#[derive(Debug)]
#[must_use = "every delivered request must be answered"]
pub struct ReplyHandle<'a> {
    stream: Option<ConnectionStream>,
    _channel: PhantomData<&'a mut RequestChannel>,
}

impl ReplyHandle<'_> {
    fn new(stream: ConnectionStream) -> Self {
        Self {
            stream: Some(stream),
            _channel: PhantomData,
        }
    }

    /// Sends `frame` as the reply, consuming the obligation.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Reply`] when the client can no longer be
    /// written to. The obligation is discharged either way.
    pub fn send(mut self, frame: &[u8]) -> Result<(), ChannelError> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        write_frame(&mut stream, frame).map_err(|source| ChannelError::Reply { source })
    }
}

impl Drop for ReplyHandle<'_> {
    fn drop(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        warn!(target: TRANSPORT_TARGET, "reply handle dropped unsent; sending fallback");
        let line = match Reply::fail(INTERNAL_SERVER_ERROR).to_line() {
            Ok(line) => line,
            Err(error) => {
                warn!(target: TRANSPORT_TARGET, %error, "failed to encode fallback reply");
                return;
            }
        };
        if let Err(error) = write_frame(&mut stream, line.as_bytes()) {
            warn!(target: TRANSPORT_TARGET, %error, "failed to send fallback reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpStream;

    use composte_protocol::ReplyStatus;

    use super::*;
    use crate::transport::TransportContext;

    fn channel() -> (RequestChannel, u16) {
        let channel = TransportContext::default()
            .request_channel(&SocketEndpoint::tcp("127.0.0.1", 0))
            .expect("bind request channel");
        let SocketEndpoint::Tcp { port, .. } = channel.endpoint() else {
            panic!("expected tcp endpoint");
        };
        let port = *port;
        (channel, port)
    }

    fn send_request(port: u16, line: &str) -> TcpStream {
        let mut client = TcpStream::connect(("127.0.0.1", port)).expect("connect");
        client.write_all(line.as_bytes()).expect("write request");
        client
    }

    fn read_reply(client: TcpStream) -> String {
        let mut reply = String::new();
        BufReader::new(client)
            .read_line(&mut reply)
            .expect("read reply");
        reply
    }

    #[test]
    fn empty_poll_times_out() {
        let (mut channel, _) = channel();
        let started = Instant::now();
        assert!(
            channel
                .poll(Duration::from_millis(50), &AtomicBool::new(false))
                .is_none()
        );
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn cancelled_poll_returns_immediately() {
        let (mut channel, _) = channel();
        let started = Instant::now();
        assert!(
            channel
                .poll(Duration::from_secs(5), &AtomicBool::new(true))
                .is_none()
        );
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn delivers_one_payload_and_sends_the_reply() {
        let (mut channel, port) = channel();
        let client = send_request(port, "hello\n");

        let delivery = channel
            .poll(Duration::from_secs(2), &AtomicBool::new(false))
            .expect("delivery");
        let (payload, reply) = delivery.into_parts();
        assert_eq!(payload, b"hello");
        reply.send(b"world").expect("send reply");

        assert_eq!(read_reply(client), "world\n");
    }

    #[test]
    fn dropped_handles_send_a_fallback_failure() {
        let (mut channel, port) = channel();
        let client = send_request(port, "hello\n");

        let delivery = channel
            .poll(Duration::from_secs(2), &AtomicBool::new(false))
            .expect("delivery");
        drop(delivery);

        let reply = Reply::parse(&read_reply(client)).expect("fallback reply");
        assert_eq!(reply.status, ReplyStatus::Fail);
        assert_eq!(reply.payload_or_reason, INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn clients_that_hang_up_carry_no_obligation() {
        let (mut channel, port) = channel();
        drop(send_request(port, "no newline"));
        assert!(
            channel
                .poll(Duration::from_millis(200), &AtomicBool::new(false))
                .is_none()
        );
    }

    #[test]
    fn badly_escaped_requests_are_answered_with_a_failure() {
        let (mut channel, port) = channel();
        let client = send_request(port, "bad \u{1b}x escape\n");
        assert!(
            channel
                .poll(Duration::from_millis(200), &AtomicBool::new(false))
                .is_none()
        );

        let reply = Reply::parse(&read_reply(client)).expect("fallback reply");
        assert_eq!(reply.status, ReplyStatus::Fail);
        assert_eq!(reply.payload_or_reason, INTERNAL_SERVER_ERROR);
    }
}
