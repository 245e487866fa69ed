//! HTTP transport for Scrapedeck.
//!
//! Provides [`HttpTransport`], a JSON-over-HTTP client bound to one base
//! URL, and [`HttpAuthService`], the production
//! [`AuthService`](scrapedeck_session::AuthService) built on it.
//!
//! Error bodies follow the backend convention: a `detail` field carrying
//! the user-facing message. When it is missing, each call supplies its own
//! fallback text. A `401` on a call made with a bearer token raises the
//! session's [`UnauthorizedSignal`](scrapedeck_session::UnauthorizedSignal)
//! before the error is returned.

mod auth_service;
mod error;
mod http;

pub use auth_service::{
    FORGOT_PASSWORD_PATH, HttpAuthService, LOGIN_PATH, REFRESH_PATH, RESEND_VERIFICATION_PATH,
    SIGNUP_PATH, VERIFY_EMAIL_PATH,
};
pub use error::TransportError;
pub use http::{Call, HttpTransport, HttpTransportBuilder, error_message};
