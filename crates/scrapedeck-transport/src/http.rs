//! JSON-over-HTTP plumbing shared by every backend call.

use std::fmt;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use scrapedeck_protocol::ErrorBody;
use scrapedeck_session::UnauthorizedSignal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::TransportError;

const DEFAULT_USER_AGENT: &str = concat!("scrapedeck/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Call
// ---------------------------------------------------------------------------

/// One request to the backend, described before it is sent.
///
/// ```rust
/// use scrapedeck_protocol::EmailRequest;
/// use scrapedeck_transport::Call;
///
/// let call = Call::post("/auth/forgot-password")
///     .json(&EmailRequest { email: "a@b.com".into() })
///     .unwrap()
///     .fallback("Failed to process password reset request");
/// assert_eq!(call.to_string(), "POST /auth/forgot-password");
/// ```
#[derive(Clone)]
pub struct Call {
    method: Method,
    path: String,
    bearer: Option<String>,
    query: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    timeout: Option<Duration>,
    fallback: &'static str,
}

impl Call {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            bearer: None,
            query: Vec::new(),
            body: None,
            timeout: None,
            fallback: "Request failed",
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attaches a JSON body.
    ///
    /// # Errors
    /// [`TransportError::Protocol`] if `body` can't be encoded.
    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, TransportError> {
        self.body = Some(scrapedeck_protocol::encode(body)?);
        Ok(self)
    }

    /// Sends `Authorization: Bearer <token>`. A `401` on a call with a
    /// bearer token raises the transport's unauthorized signal.
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Overrides the transport's timeout for this call alone.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Error message to use when a failed response carries no `detail`.
    pub fn fallback(mut self, message: &'static str) -> Self {
        self.fallback = message;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_authenticated(&self) -> bool {
        self.bearer.is_some()
    }
}

/// `METHOD /path`, used as the source of unauthorized signals and in logs.
impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("authenticated", &self.is_authenticated())
            .field("query", &self.query)
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// HttpTransport
// ---------------------------------------------------------------------------

/// A `reqwest` client bound to one base URL.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    unauthorized: Option<UnauthorizedSignal>,
}

impl HttpTransport {
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::default()
    }

    /// A transport with default settings and no unauthorized signal.
    ///
    /// # Errors
    /// [`TransportError::Configuration`] if `base_url` isn't an http(s) URL.
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        Self::builder().base_url(base_url).build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns a transport sharing this one's client that raises `signal`
    /// on `401` responses to authenticated calls.
    pub fn with_unauthorized_signal(mut self, signal: UnauthorizedSignal) -> Self {
        self.unauthorized = Some(signal);
        self
    }

    /// Sends `call` and decodes the 2xx body as `T`.
    ///
    /// # Errors
    /// - [`TransportError::Request`] if no response arrived.
    /// - [`TransportError::Status`] for non-2xx responses.
    /// - [`TransportError::Protocol`] if the body doesn't decode as `T`.
    pub async fn send<T: DeserializeOwned>(&self, call: Call) -> Result<T, TransportError> {
        let body = self.dispatch(call).await?;
        Ok(scrapedeck_protocol::decode(&body)?)
    }

    /// Sends `call` and ignores the 2xx body.
    ///
    /// # Errors
    /// As [`send`](Self::send), minus decoding.
    pub async fn send_empty(&self, call: Call) -> Result<(), TransportError> {
        self.dispatch(call).await.map(drop)
    }

    /// Sends `call` and returns the status and raw body whatever the
    /// status. Only a missing response is an error.
    ///
    /// Still raises the unauthorized signal for a `401` on a bearer call.
    pub async fn exchange(&self, call: &Call) -> Result<(StatusCode, Vec<u8>), TransportError> {
        let url = format!("{}{}", self.base_url, call.path);
        let mut request = self.client.request(call.method.clone(), url);
        if let Some(token) = &call.bearer {
            request = request.bearer_auth(token);
        }
        if !call.query.is_empty() {
            request = request.query(&call.query);
        }
        if let Some(timeout) = call.timeout {
            request = request.timeout(timeout);
        }
        if let Some(body) = &call.body {
            request = request
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(body.clone());
        }

        let response = request.send().await.inspect_err(|e| {
            warn!(call = %call, error = %e, "request failed");
        })?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();

        if status == StatusCode::UNAUTHORIZED && call.is_authenticated() {
            if let Some(signal) = &self.unauthorized {
                signal.raise(call.to_string());
            }
        }
        Ok((status, body))
    }

    async fn dispatch(&self, call: Call) -> Result<Vec<u8>, TransportError> {
        let (status, body) = self.exchange(&call).await?;
        if status.is_success() {
            debug!(call = %call, status = status.as_u16(), "request succeeded");
            return Ok(body);
        }

        let message = error_message(&body).unwrap_or_else(|| call.fallback.to_owned());
        debug!(call = %call, status = status.as_u16(), %message, "request rejected");
        Err(TransportError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("unauthorized_signal", &self.unauthorized.is_some())
            .finish()
    }
}

/// The `detail` text of an error body, if the body is JSON and has one.
pub fn error_message(body: &[u8]) -> Option<String> {
    scrapedeck_protocol::decode::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message())
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct HttpTransportBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    unauthorized: Option<UnauthorizedSignal>,
}

impl HttpTransportBuilder {
    /// Required. A trailing slash is ignored.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Whole-request timeout. Unset means the client default (none).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn unauthorized_signal(mut self, signal: UnauthorizedSignal) -> Self {
        self.unauthorized = Some(signal);
        self
    }

    /// # Errors
    /// [`TransportError::Configuration`] for a missing or non-http(s) base
    /// URL, [`TransportError::Request`] if the client can't be built.
    pub fn build(self) -> Result<HttpTransport, TransportError> {
        let base_url = self
            .base_url
            .ok_or_else(|| TransportError::Configuration("base URL is required".into()))?;
        let base_url = base_url.trim_end_matches('/').to_owned();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(TransportError::Configuration(format!(
                "base URL must start with http:// or https://, got {base_url:?}"
            )));
        }

        let mut builder = Client::builder()
            .user_agent(self.user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned()));
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(HttpTransport {
            client: builder.build()?,
            base_url,
            unauthorized: self.unauthorized,
        })
    }
}
