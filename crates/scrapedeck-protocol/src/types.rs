//! Request and response bodies for the Scrapedeck backend.
//!
//! Field names follow the backend exactly (snake_case JSON), so most types
//! derive serde without renames. The exceptions are documented where they
//! occur.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Auth requests
// ---------------------------------------------------------------------------

/// Email + password, sent to exchange credentials for a token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Account registration. The backend answers with a confirmation only;
/// no tokens are issued until the user logs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
}

/// Exchange a refresh token for a fresh access/refresh pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Body of the endpoints that only need an address: resending the
/// verification mail and starting a password reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

// ---------------------------------------------------------------------------
// Token responses
// ---------------------------------------------------------------------------

/// Raw token response from the login and refresh endpoints.
///
/// The backend has shipped two naming conventions over time:
/// `{access_token, refresh_token}` and `{access, refresh}`. Both are
/// accepted. Each name is its own optional field (rather than a serde
/// alias) so a body carrying both spellings still decodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    access: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    refresh: Option<String>,
}

impl TokenResponse {
    /// Builds a response in the canonical `access_token`/`refresh_token` form.
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
            ..Self::default()
        }
    }

    /// The access token under either name. Empty strings count as absent.
    pub fn access(&self) -> Option<&str> {
        first_present(&self.access_token, &self.access)
    }

    /// The refresh token under either name. Empty strings count as absent.
    pub fn refresh(&self) -> Option<&str> {
        first_present(&self.refresh_token, &self.refresh)
    }

    /// Returns the usable pair, or `None` if either token is missing.
    pub fn into_pair(self) -> Option<TokenPair> {
        let access_token = self.access()?.to_owned();
        let refresh_token = self.refresh()?.to_owned();
        Some(TokenPair {
            access_token,
            refresh_token,
        })
    }
}

fn first_present<'a>(preferred: &'a Option<String>, fallback: &'a Option<String>) -> Option<&'a str> {
    preferred
        .as_deref()
        .filter(|s| !s.is_empty())
        .or_else(|| fallback.as_deref().filter(|s| !s.is_empty()))
}

/// A validated access + refresh token pair.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Tokens are credentials, so `Debug` never prints them.
impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Error bodies
// ---------------------------------------------------------------------------

/// Error body returned by the backend on non-2xx responses.
///
/// `detail` is usually a human-readable string. Validation failures carry
/// a list of objects instead, each with a `msg` field.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    /// The user-facing message carried by `detail`, if any.
    pub fn message(&self) -> Option<String> {
        match self.detail.as_ref()? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) if s.is_empty() => None,
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(items) => {
                let msgs: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                    .collect();
                if msgs.is_empty() {
                    None
                } else {
                    Some(msgs.join("; "))
                }
            }
            other => Some(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Dashboard: API keys
// ---------------------------------------------------------------------------

/// An API key as listed on the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub key: String,
    #[serde(default)]
    pub created: Option<String>,
    /// The backend uses camelCase for this one field.
    #[serde(default, rename = "lastUsed")]
    pub last_used: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Request body for creating an API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApiKey {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Dashboard: profile
// ---------------------------------------------------------------------------

/// The signed-in user's profile. Fields the client doesn't model are kept
/// in `extra` so nothing is lost when a page renders them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub name: String,
}

/// Password change for a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
    pub new_password_confirm: String,
}

// ---------------------------------------------------------------------------
// Playground
// ---------------------------------------------------------------------------

/// A one-off scrape from the public playground.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaygroundRequest {
    pub url: String,
    pub user_prompt: String,
    /// JSON schema for the extracted data, passed through as text.
    pub schema: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaygroundResponse {
    pub data: serde_json::Value,
    pub status: String,
    pub message: String,
    #[serde(default)]
    pub request_id: Option<String>,
}
