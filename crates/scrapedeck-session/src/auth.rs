//! The auth service contract the session manager depends on.
//!
//! The session layer never talks HTTP itself. It calls an [`AuthService`]
//! to exchange credentials and refresh tokens. Production code uses the
//! HTTP implementation from `scrapedeck-transport`; tests plug in scripted
//! fakes.

use std::future::Future;

use scrapedeck_protocol::{SignupRequest, TokenResponse};

use crate::SessionError;

/// Remote credential exchange.
///
/// # Trait bounds
///
/// - `Send + Sync` → the service is shared by the session manager's
///   background tasks (timers, the unauthorized listener).
/// - `'static` → it lives as long as the session manager.
///
/// # Example
///
/// ```rust
/// use scrapedeck_protocol::{SignupRequest, TokenResponse};
/// use scrapedeck_session::{AuthService, SessionError};
///
/// /// Issues the same pair to everyone. Only useful offline.
/// struct StaticAuth;
///
/// impl AuthService for StaticAuth {
///     async fn login(&self, _email: &str, _password: &str) -> Result<TokenResponse, SessionError> {
///         Ok(TokenResponse::new("access", "refresh"))
///     }
///
///     async fn signup(&self, _request: &SignupRequest) -> Result<(), SessionError> {
///         Ok(())
///     }
///
///     async fn refresh(&self, _refresh_token: &str) -> Result<TokenResponse, SessionError> {
///         Ok(TokenResponse::new("access", "refresh"))
///     }
/// }
/// ```
pub trait AuthService: Send + Sync + 'static {
    /// Exchanges credentials for a token pair.
    ///
    /// The raw response is returned as-is; the session manager checks that
    /// both tokens are present.
    fn login(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<TokenResponse, SessionError>> + Send;

    /// Registers an account. Does not issue tokens.
    fn signup(
        &self,
        request: &SignupRequest,
    ) -> impl Future<Output = Result<(), SessionError>> + Send;

    /// Exchanges a refresh token for a new pair. Any non-2xx answer is an
    /// error.
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenResponse, SessionError>> + Send;
}
