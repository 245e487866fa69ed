//! Error types for the protocol layer.
//!
//! Each crate in Scrapedeck defines its own error enum. A `ProtocolError`
//! always means a body could not be turned into (or out of) JSON, never
//! that the network or the session failed.

/// Errors that can occur while encoding or decoding wire bodies.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into JSON bytes).
    #[error("encode failed: {0}")]
    Encode(#[source] serde_json::Error),

    /// Deserialization failed (turning JSON bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields, or an
    /// HTML error page returned by a proxy in front of the API.
    #[error("decode failed: {0}")]
    Decode(#[source] serde_json::Error),
}
