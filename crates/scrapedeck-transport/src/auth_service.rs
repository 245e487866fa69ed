//! The production [`AuthService`]: the backend's `/auth` endpoints.

use scrapedeck_protocol::{Credentials, EmailRequest, RefreshRequest, SignupRequest, TokenResponse};
use scrapedeck_session::{AuthService, SessionError};

use crate::{Call, HttpTransport, TransportError};

pub const LOGIN_PATH: &str = "/auth/get_tokens";
pub const SIGNUP_PATH: &str = "/auth/register";
pub const REFRESH_PATH: &str = "/api/v1/auth/refresh-token";
pub const RESEND_VERIFICATION_PATH: &str = "/auth/resend_verification";
pub const FORGOT_PASSWORD_PATH: &str = "/auth/forgot-password";
pub const VERIFY_EMAIL_PATH: &str = "/auth/verify-email";

/// Credential exchange over HTTP. None of these calls carry a bearer
/// token, so none of them raise the unauthorized signal.
#[derive(Debug, Clone)]
pub struct HttpAuthService {
    http: HttpTransport,
}

impl HttpAuthService {
    pub fn new(http: HttpTransport) -> Self {
        Self { http }
    }

    pub fn transport(&self) -> &HttpTransport {
        &self.http
    }

    /// Sends the account verification mail again.
    pub async fn resend_verification(&self, email: &str) -> Result<(), TransportError> {
        let call = Call::post(RESEND_VERIFICATION_PATH)
            .json(&EmailRequest {
                email: email.to_owned(),
            })?
            .fallback("Failed to resend verification email");
        self.http.send_empty(call).await
    }

    /// Starts a password reset for `email`.
    pub async fn forgot_password(&self, email: &str) -> Result<(), TransportError> {
        let call = Call::post(FORGOT_PASSWORD_PATH)
            .json(&EmailRequest {
                email: email.to_owned(),
            })?
            .fallback("Failed to process password reset request");
        self.http.send_empty(call).await
    }

    /// Confirms an address with the token from the verification mail.
    pub async fn verify_email(&self, token: &str) -> Result<(), TransportError> {
        let call = Call::get(VERIFY_EMAIL_PATH)
            .query("token", token)
            .fallback("Email verification failed");
        self.http.send_empty(call).await
    }
}

impl AuthService for HttpAuthService {
    async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, SessionError> {
        let call = Call::post(LOGIN_PATH)
            .json(&Credentials {
                email: email.to_owned(),
                password: password.to_owned(),
            })?
            .fallback("Login failed");
        Ok(self.http.send(call).await?)
    }

    async fn signup(&self, request: &SignupRequest) -> Result<(), SessionError> {
        let call = Call::post(SIGNUP_PATH).json(request)?.fallback("Signup failed");
        Ok(self.http.send_empty(call).await?)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, SessionError> {
        let call = Call::post(REFRESH_PATH)
            .json(&RefreshRequest {
                refresh_token: refresh_token.to_owned(),
            })?
            .fallback("Failed to refresh token");
        Ok(self.http.send(call).await?)
    }
}
