//! Error types for the session layer.

/// Errors that can occur while acquiring or maintaining a session.
///
/// Only `login` and `signup` return these to callers. Background refreshes
/// resolve to "no token" instead and end the session internally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The auth service answered, but without the expected token fields.
    #[error("invalid response format: missing access or refresh token")]
    InvalidResponseFormat,

    /// No refresh token in memory or in durable storage. No network call
    /// is attempted.
    #[error("no refresh token available")]
    NoRefreshToken,

    /// A call to the auth service failed: network error or non-2xx
    /// response. `message` is the backend's `detail` text when it sent one,
    /// otherwise a generic message for the operation.
    #[error("{message}")]
    Service {
        /// HTTP status, or `None` if no response was received.
        status: Option<u16>,
        message: String,
    },

    /// An access token couldn't be decoded while checking its expiry.
    /// Expiry checks fail closed, so this never escapes the crate.
    #[error("token decode failed: {0}")]
    TokenDecode(String),

    /// Durable storage rejected a read or write.
    #[error("token storage failed: {0}")]
    Storage(String),
}

impl SessionError {
    /// Shorthand for a [`SessionError::Service`] error.
    pub fn service(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Service {
            status,
            message: message.into(),
        }
    }
}
