//! Edit command dispatch.
//!
//! A [`Command`](composte_protocol::Command) names an operation registered in
//! the static [`OperationRegistry`]. The [`Dispatcher`] coerces the raw wire
//! arguments to the descriptor's kinds, validates the optional part and
//! offset, runs the executor against the notation engine, and applies the
//! resulting [`Alteration`](crate::engine::Alteration) to the project at the
//! addressed [`Granularity`]:
//!
//! | part index | offset | update path |
//! |---|---|---|
//! | yes | yes | one location within the part |
//! | yes | no | the whole part |
//! | no | no | every part |
//!
//! Unknown operations answer `INVALID OPERATION`. Every other failure is a
//! [`GenericError`] whose wire reason is `Internal server error`.

mod dispatcher;
mod errors;
mod registry;
mod service;

pub use self::dispatcher::{Dispatcher, Granularity};
pub use self::errors::{EditFailure, GenericError};
pub use self::registry::{
    ArgKind, ArgValue, Arguments, CoercionError, Executor, OperationDescriptor, OperationRegistry,
};
pub use self::service::{CommandParser, EditHandler};

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
