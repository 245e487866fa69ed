//! Access token expiry checks.
//!
//! Access tokens are JWTs: `header.payload.signature`, each segment base64.
//! The client never verifies the signature (the backend does); it only
//! reads the `exp` claim to decide when to refresh. Anything that can't be
//! read is treated as expired.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

use crate::SessionError;

/// The claims the client cares about.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Claims {
    /// Expiration instant, whole seconds since the Unix epoch. Fractional
    /// values are rounded down.
    #[serde(deserialize_with = "whole_seconds")]
    pub exp: i64,
    #[serde(default)]
    pub sub: Option<String>,
}

fn whole_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    if !secs.is_finite() {
        return Err(D::Error::custom("exp is not a finite number"));
    }
    Ok(secs.floor() as i64)
}

/// Decodes the payload segment of `token` without verifying it.
///
/// # Errors
/// [`SessionError::TokenDecode`] if the token has no payload segment, the
/// segment isn't base64, or the JSON lacks a numeric `exp`.
pub fn decode_claims(token: &str) -> Result<Claims, SessionError> {
    let payload = token
        .split('.')
        .nth(1)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SessionError::TokenDecode("missing payload segment".into()))?;

    // JWTs use unpadded base64url; tolerate padded standard base64 too.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .or_else(|_| STANDARD.decode(payload))
        .map_err(|e| SessionError::TokenDecode(e.to_string()))?;

    serde_json::from_slice(&bytes).map_err(|e| SessionError::TokenDecode(e.to_string()))
}

/// `true` if `token` is expired at `now` (epoch seconds).
///
/// A token whose `exp` equals `now` is already expired. Undecodable
/// tokens are expired (fail closed).
pub fn is_expired_at(token: &str, now: i64) -> bool {
    match decode_claims(token) {
        Ok(claims) => claims.exp <= now,
        Err(e) => {
            tracing::debug!(error = %e, "treating undecodable access token as expired");
            true
        }
    }
}

/// `true` if `token` is expired right now.
pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, now_secs())
}

/// Current wall-clock time in epoch seconds.
pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
