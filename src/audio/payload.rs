//! Byte-to-text payload codec for finished captures.
//!
//! The channel speaks JSON text frames, so raw PCM has to ride inside a
//! string field. Standard base64 keeps that conversion lossless in both
//! directions.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// A finished capture in its transmissible form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload(String);

impl EncodedPayload {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

#[derive(Debug, Error)]
#[error("payload is not valid base64: {0}")]
pub struct PayloadDecodeError(#[from] base64::DecodeError);

/// Encode assembled capture bytes for a text frame.
pub fn encode(bytes: &[u8]) -> EncodedPayload {
    EncodedPayload(STANDARD.encode(bytes))
}

/// Recover the exact bytes [`encode`] was given.
pub fn decode(payload: &str) -> Result<Vec<u8>, PayloadDecodeError> {
    Ok(STANDARD.decode(payload)?)
}
