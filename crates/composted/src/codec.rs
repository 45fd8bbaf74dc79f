//! Encryption boundary applied at the edge of both channels.
//!
//! Codecs see whole messages and arbitrary bytes. Line framing belongs to
//! the transport, which escapes line breaks in ciphertext, so a codec may
//! emit any byte and `decrypt(encrypt(m)) == m` holds for every message.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

/// Tracing target for codec events.
pub(crate) const CODEC_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::codec");

/// Errors raised when an incoming message cannot be decrypted.
#[derive(Debug, Error)]
pub enum DecryptError {
    /// Ciphertext was malformed or forged.
    #[error("malformed ciphertext: {message}")]
    Malformed {
        /// Human readable explanation.
        message: String,
    },
}

/// Errors raised when an outgoing message cannot be encrypted.
#[derive(Debug, Error)]
pub enum EncryptError {
    /// Plaintext could not be encoded.
    #[error("unencodable plaintext: {message}")]
    Unencodable {
        /// Human readable explanation.
        message: String,
    },
}

/// Pluggable encrypt/decrypt pair owned by one server instance.
pub trait Codec: Send + Sync {
    /// Encrypts a plaintext message into one frame of ciphertext.
    fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, EncryptError>;

    /// Decrypts one frame of ciphertext.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<String, DecryptError>;
}

impl<C> Codec for Arc<C>
where
    C: Codec + ?Sized,
{
    fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, EncryptError> {
        (**self).encrypt(plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<String, DecryptError> {
        (**self).decrypt(ciphertext)
    }
}

/// Codec that passes UTF-8 text through unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityCodec;

impl Codec for IdentityCodec {
    fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, EncryptError> {
        Ok(plaintext.as_bytes().to_vec())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<String, DecryptError> {
        String::from_utf8(ciphertext.to_vec()).map_err(|error| DecryptError::Malformed {
            message: error.to_string(),
        })
    }
}

/// Wraps another codec and logs every message crossing the boundary.
#[derive(Debug, Default, Clone)]
pub struct LoggingCodec<C> {
    inner: C,
}

impl<C> LoggingCodec<C> {
    /// Wraps `inner`.
    pub const fn new(inner: C) -> Self {
        Self { inner }
    }

    /// Returns the wrapped codec.
    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: Codec> Codec for LoggingCodec<C> {
    fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, EncryptError> {
        let result = self.inner.encrypt(plaintext);
        match &result {
            Ok(ciphertext) => debug!(
                target: CODEC_TARGET,
                plaintext,
                bytes = ciphertext.len(),
                "encrypted message"
            ),
            Err(error) => debug!(target: CODEC_TARGET, %error, "encryption failed"),
        }
        result
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<String, DecryptError> {
        let result = self.inner.decrypt(ciphertext);
        match &result {
            Ok(plaintext) => debug!(
                target: CODEC_TARGET,
                plaintext = plaintext.as_str(),
                bytes = ciphertext.len(),
                "decrypted message"
            ),
            Err(error) => debug!(target: CODEC_TARGET, %error, "decryption failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("")]
    #[case(r#"{"project_id":"p1","operation":"transpose","args":["0","2"]}"#)]
    #[case("ünïcödé ♪")]
    #[case("line one\nline two")]
    #[case("\r\n\u{1b}n\n")]
    fn identity_decrypt_inverts_encrypt(#[case] message: &str) {
        let codec = IdentityCodec;
        let ciphertext = codec.encrypt(message).expect("encrypt");
        assert_eq!(codec.decrypt(&ciphertext).expect("decrypt"), message);
    }

    #[test]
    fn line_breaks_pass_through_unchanged() {
        let ciphertext = IdentityCodec.encrypt("one\r\ntwo").expect("encrypt");
        assert_eq!(ciphertext, b"one\r\ntwo");
    }

    #[test]
    fn rejects_invalid_utf8() {
        assert!(matches!(
            IdentityCodec.decrypt(&[0xff, 0xfe]),
            Err(DecryptError::Malformed { .. })
        ));
    }

    #[test]
    fn logging_codec_delegates() {
        let codec = LoggingCodec::new(IdentityCodec);
        let ciphertext = codec.encrypt("hello").expect("encrypt");
        assert_eq!(codec.decrypt(&ciphertext).expect("decrypt"), "hello");
        assert!(codec.decrypt(&[b'a', 0xff]).is_err());
    }
}
