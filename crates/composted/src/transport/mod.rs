//! Socket transport for the request and broadcast channels.
//!
//! A [`TransportContext`] owns the shared transport settings and hands out
//! channels bound to configured endpoints. The request channel enforces the
//! one-reply-per-request discipline; the broadcast channel fans messages out
//! to every connected subscriber.

mod broadcast;
mod context;
mod errors;
mod listener;
mod request;
mod stream;

pub use self::broadcast::BroadcastChannel;
pub use self::context::{TransportContext, TransportSettings};
pub use self::errors::{ChannelError, ListenerError};
pub use self::request::{Delivery, ReplyHandle, RequestChannel};

pub(crate) use self::listener::SocketListener;
pub(crate) use self::stream::ConnectionStream;

pub(crate) const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
