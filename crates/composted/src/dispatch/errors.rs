//! Error types for command dispatch.
//!
//! Every failure after the operation lookup collapses into [`GenericError`],
//! whose wire form is the opaque `Internal server error`. The concrete
//! [`EditFailure`] is kept as its source for server-side logs.

use thiserror::Error;

use super::registry::CoercionError;
use crate::engine::EngineError;
use crate::store::StoreError;

/// Concrete reason an edit could not be applied.
#[derive(Debug, Error)]
pub enum EditFailure {
    /// An argument did not match its declared kind.
    #[error(transparent)]
    Coercion(#[from] CoercionError),
    /// The explicit offset was negative or not finite.
    #[error("offset {offset} must be a finite, non-negative number")]
    InvalidOffset {
        /// Offending offset.
        offset: f64,
    },
    /// The explicit part index was negative.
    #[error("part index {part_index} must not be negative")]
    NegativePart {
        /// Offending part index.
        part_index: i64,
    },
    /// An offset was supplied without a part to apply it to.
    #[error("offset {offset} was supplied without a part index")]
    OffsetWithoutPart {
        /// Orphaned offset.
        offset: f64,
    },
    /// The notation engine rejected the edit.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// Fetching or updating the project failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Opaque dispatch failure.
#[derive(Debug, Error)]
#[error("internal error")]
pub struct GenericError {
    #[source]
    cause: EditFailure,
}

impl GenericError {
    /// Underlying failure, for logging only.
    #[must_use]
    pub fn cause(&self) -> &EditFailure {
        &self.cause
    }
}

impl From<EditFailure> for GenericError {
    fn from(cause: EditFailure) -> Self {
        Self { cause }
    }
}

impl From<StoreError> for GenericError {
    fn from(error: StoreError) -> Self {
        EditFailure::from(error).into()
    }
}
