//! Composte collaboration server.
//!
//! Clients submit encrypted edit commands for shared music-notation projects
//! over a request/reply channel. The server applies each edit through a
//! [`NotationEngine`], persists it through a [`ProjectStore`], answers with a
//! status reply, and rebroadcasts the edit to every subscriber of the
//! broadcast channel.
//!
//! The pieces compose bottom-up:
//!
//! - [`transport`] binds the request and broadcast channels through an
//!   injectable [`TransportContext`].
//! - [`Server`] runs the session loop: decrypt, preprocess, handle, encrypt,
//!   reply. Requests are processed one at a time and every delivered request
//!   gets exactly one reply.
//! - [`dispatch`] resolves the named operation in the static registry and
//!   applies it at the requested granularity.
//! - [`run_daemon`] wires configuration, telemetry, signals, and the default
//!   collaborators into a running process.

mod bootstrap;
mod codec;
pub mod dispatch;
mod engine;
mod health;
mod process;
mod session;
mod store;
pub mod telemetry;
pub mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, ServerCodec, ServerHandler, SystemConfigLoader,
    bootstrap_with,
};
pub use codec::{Codec, DecryptError, EncryptError, IdentityCodec, LoggingCodec};
pub use engine::{Alteration, EngineError, NotationEngine, RangeEngine};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon};
pub use session::{BroadcastError, Broadcaster, Handler, Preprocess, Server};
pub use store::{
    MemoryProject, MemoryProjectStore, Project, ProjectStore, RecordedUpdate, StoreError,
    UpdateScope,
};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::{ChannelError, ListenerError, TransportContext, TransportSettings};

#[cfg(test)]
mod tests;
