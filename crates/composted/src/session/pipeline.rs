//! Per-request pipeline: decrypt, preprocess, handle, encrypt.
//!
//! Every stage reports its failure as a [`Failure`]; [`run`] always returns
//! one frame to send, falling back to a failure reply. A panic in any stage,
//! codec included, is caught and answered like a failed handler.

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, warn};

use composte_protocol::{
    DECRYPT_FAILURE, ENCRYPT_FAILURE, INTERNAL_SERVER_ERROR, ProtocolError, Reply,
};

use super::{Broadcaster, Handler, Preprocess, SESSION_TARGET};
use crate::codec::{Codec, DecryptError, EncryptError};

/// Stage at which a request failed, with the cause kept for logs.
#[derive(Debug)]
pub(crate) enum Failure {
    Decrypt(DecryptError),
    Preprocess(String),
    Handle(String),
    Panic(String),
    Encode(ProtocolError),
    Encrypt(EncryptError),
}

impl Failure {
    /// Reason sent to the client.
    pub(crate) const fn reason(&self) -> &'static str {
        match self {
            Self::Decrypt(_) => DECRYPT_FAILURE,
            Self::Preprocess(_) | Self::Handle(_) | Self::Panic(_) | Self::Encode(_) => {
                INTERNAL_SERVER_ERROR
            }
            Self::Encrypt(_) => ENCRYPT_FAILURE,
        }
    }

    const fn stage(&self) -> &'static str {
        match self {
            Self::Decrypt(_) => "decrypt",
            Self::Preprocess(_) => "preprocess",
            Self::Handle(_) => "handle",
            Self::Panic(_) => "panic",
            Self::Encode(_) => "encode",
            Self::Encrypt(_) => "encrypt",
        }
    }

    fn detail(&self) -> String {
        match self {
            Self::Decrypt(error) => error.to_string(),
            Self::Encrypt(error) => error.to_string(),
            Self::Encode(error) => error.to_string(),
            Self::Preprocess(message) | Self::Handle(message) => message.clone(),
            Self::Panic(message) => format!("pipeline panicked: {message}"),
        }
    }
}

/// Runs one request through the pipeline and returns the reply frame.
pub(crate) fn run<C, P, H>(
    codec: &C,
    preprocess: &P,
    handler: &H,
    broadcaster: &dyn Broadcaster,
    payload: &[u8],
) -> Vec<u8>
where
    C: Codec,
    P: Preprocess,
    H: Handler<P::Output>,
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        process(codec, preprocess, handler, broadcaster, payload)
    }))
    .unwrap_or_else(|panic| Err(Failure::Panic(panic_message(panic.as_ref()))));
    match outcome {
        Ok(frame) => frame,
        Err(failure) => {
            warn!(
                target: SESSION_TARGET,
                stage = failure.stage(),
                error = %failure.detail(),
                "request failed"
            );
            failure_frame(codec, failure.reason())
        }
    }
}

fn process<C, P, H>(
    codec: &C,
    preprocess: &P,
    handler: &H,
    broadcaster: &dyn Broadcaster,
    payload: &[u8],
) -> Result<Vec<u8>, Failure>
where
    C: Codec,
    P: Preprocess,
    H: Handler<P::Output>,
{
    let message = codec.decrypt(payload).map_err(Failure::Decrypt)?;
    let input = preprocess
        .preprocess(message)
        .map_err(|error| Failure::Preprocess(error.to_string()))?;
    let reply = handler
        .handle(broadcaster, input)
        .map_err(|error| Failure::Handle(error.to_string()))?;
    debug!(
        target: SESSION_TARGET,
        ok = reply.is_ok(),
        "request handled"
    );
    let line = reply.to_line().map_err(Failure::Encode)?;
    codec.encrypt(&line).map_err(Failure::Encrypt)
}

/// Builds the failure reply, sending it in plaintext if the codec refuses
/// it or panics.
pub(crate) fn failure_frame<C: Codec>(codec: &C, reason: &str) -> Vec<u8> {
    let line = Reply::fail(reason).to_line().unwrap_or_else(|_| {
        format!(r#"{{"status":"fail","payload_or_reason":"{reason}"}}"#)
    });
    let encrypted = panic::catch_unwind(AssertUnwindSafe(|| codec.encrypt(&line)))
        .unwrap_or_else(|panic| {
            Err(EncryptError::Unencodable {
                message: format!("codec panicked: {}", panic_message(panic.as_ref())),
            })
        });
    encrypted.unwrap_or_else(|error| {
        warn!(
            target: SESSION_TARGET,
            %error,
            "failure reply could not be encrypted; sending plaintext"
        );
        line.into_bytes()
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("non-string panic payload")
    }
}
