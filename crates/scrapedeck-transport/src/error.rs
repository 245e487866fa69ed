use scrapedeck_protocol::ProtocolError;
use scrapedeck_session::SessionError;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request never produced a response: connection refused, DNS,
    /// timeout, TLS.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-2xx status. `message` is the body's
    /// `detail` text, or the operation's fallback message.
    #[error("{message}")]
    Status { status: u16, message: String },

    /// A body couldn't be encoded, or a 2xx body didn't have the expected
    /// shape.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The transport was built with invalid settings.
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl TransportError {
    /// The HTTP status, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            Self::Protocol(_) | Self::Configuration(_) => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

/// Lets [`HttpAuthService`](crate::HttpAuthService) use `?` inside
/// [`AuthService`](scrapedeck_session::AuthService) methods.
impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Status { status, message } => SessionError::service(Some(status), message),
            TransportError::Protocol(ProtocolError::Decode(_)) => SessionError::InvalidResponseFormat,
            other => SessionError::service(other.status(), other.to_string()),
        }
    }
}
