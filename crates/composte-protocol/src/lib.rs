//! Wire envelope types shared by the Composte server and its clients.
//!
//! Every request is a single JSON object describing one edit [`Command`]. The
//! server answers each request with exactly one [`Reply`]. Successful edits are
//! additionally fanned out to broadcast subscribers as the originating
//! command envelope.
//!
//! ```json
//! {"project_id":"p1","operation":"insertNote","args":["0.0","0","C4","1.0"],"part_index":0,"offset":0.0}
//! {"status":"ok","payload_or_reason":""}
//! ```

mod command;
mod reply;

pub use command::Command;
pub use reply::{Reply, ReplyStatus};

use thiserror::Error;

/// Reason sent when the requested operation name is not registered.
pub const INVALID_OPERATION: &str = "INVALID OPERATION";

/// Reason sent when an incoming message cannot be decrypted.
pub const DECRYPT_FAILURE: &str = "Decrypt failure";

/// Reason sent when a reply cannot be encrypted.
pub const ENCRYPT_FAILURE: &str = "Encrypt failure";

/// Opaque reason sent for every other server-side failure.
pub const INTERNAL_SERVER_ERROR: &str = "Internal server error";

/// Errors raised while decoding or encoding wire envelopes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The envelope was not valid JSON or did not match the schema.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The envelope was empty after trimming whitespace.
    #[error("empty envelope")]
    Empty,
}
