//! JSON encoding and decoding of request and response bodies.
//!
//! The backend speaks `application/json` exclusively, so there is a single
//! codec. Keeping it behind two functions means the transport never calls
//! `serde_json` directly and every failure arrives as a [`ProtocolError`].

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Serializes a request body into JSON bytes.
///
/// # Errors
/// Returns [`ProtocolError::Encode`] if the value cannot be represented
/// as JSON (e.g. a map with non-string keys).
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(value).map_err(ProtocolError::Encode)
}

/// Deserializes a response body from JSON bytes.
///
/// An empty body decodes as JSON `null`, so endpoints that answer
/// `204 No Content` can be decoded into `()` or `Option<T>`.
///
/// # Errors
/// Returns [`ProtocolError::Decode`] if the bytes are not valid JSON or
/// don't match the expected shape.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return serde_json::from_slice(b"null").map_err(ProtocolError::Decode);
    }
    serde_json::from_slice(data).map_err(ProtocolError::Decode)
}
