//! Reply envelope.

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Outcome marker carried by every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    /// The request was applied.
    Ok,
    /// The request was rejected or failed.
    Fail,
}

/// Response sent for exactly one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    /// Outcome of the request.
    pub status: ReplyStatus,
    /// Result payload on success, failure reason otherwise.
    pub payload_or_reason: String,
}

impl Reply {
    /// Builds a successful reply carrying `payload`.
    #[must_use]
    pub fn ok(payload: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Ok,
            payload_or_reason: payload.into(),
        }
    }

    /// Builds a failure reply carrying `reason`.
    #[must_use]
    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Fail,
            payload_or_reason: reason.into(),
        }
    }

    /// Reports whether the reply signals success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }

    /// Encodes the reply as a single JSON line without a trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Malformed`] if serialisation fails.
    pub fn to_line(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a reply from its JSON text form.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] when the text is blank or malformed.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(ProtocolError::Empty);
        }
        Ok(serde_json::from_str(trimmed)?)
    }
}
