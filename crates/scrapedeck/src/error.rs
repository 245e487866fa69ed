//! Unified error type for the Scrapedeck client.

use scrapedeck_protocol::ProtocolError;
use scrapedeck_session::SessionError;
use scrapedeck_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` variants let `?` convert sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ScrapedeckError {
    /// An HTTP-level failure (no response, non-2xx status).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A body that couldn't be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A login, signup or storage failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// No usable access token, even after trying a refresh. The caller
    /// should send the user to the login page.
    #[error("not authenticated")]
    NotAuthenticated,

    /// A playground scrape failed. `status` is 0 when no response arrived.
    #[error("{message}")]
    Playground { status: u16, message: String },

    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ScrapedeckError {
    /// `true` if the caller should re-authenticate.
    pub fn is_auth_error(&self) -> bool {
        match self {
            Self::NotAuthenticated => true,
            Self::Transport(e) => e.is_unauthorized(),
            Self::Session(SessionError::NoRefreshToken) => true,
            _ => false,
        }
    }
}
