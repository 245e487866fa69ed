//! `ScrapedeckClient` builder and wiring.
//!
//! This is the entry point for talking to Scrapedeck. It ties together all
//! the layers: transport → auth service → session manager → dashboard API.

use std::fmt;
use std::time::Duration;

use scrapedeck_session::{FileStore, SessionConfig, SessionManager, TokenStore};
use scrapedeck_transport::{HttpAuthService, HttpTransport};

use crate::{ClientConfig, ScrapedeckError};

/// Builder for configuring a [`ScrapedeckClient`].
///
/// # Example
///
/// ```rust,no_run
/// use scrapedeck::prelude::*;
///
/// # async fn run() -> Result<(), ScrapedeckError> {
/// let client = ScrapedeckClient::builder()
///     .config(ClientConfig::from_env()?)
///     .build()?;
/// client.initialize().await;
/// client.session().login("a@b.com", "pw").await?;
/// let keys = client.api_keys().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScrapedeckClientBuilder {
    config: ClientConfig,
}

impl ScrapedeckClientBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    pub fn playground_url(mut self, url: impl Into<String>) -> Self {
        self.config.playground_url = url.into();
        self
    }

    pub fn state_file(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.config.state_file = path.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config.session = config;
        self
    }

    /// Builds a client that persists tokens to `config.state_file`.
    ///
    /// # Errors
    /// [`ScrapedeckError::Transport`] if either base URL is invalid.
    pub fn build(self) -> Result<ScrapedeckClient<FileStore>, ScrapedeckError> {
        let store = FileStore::new(&self.config.state_file);
        self.build_with_store(store)
    }

    /// Builds a client over any token store.
    ///
    /// # Errors
    /// As [`build`](Self::build).
    pub fn build_with_store<S: TokenStore>(self, store: S) -> Result<ScrapedeckClient<S>, ScrapedeckError> {
        let config = self.config;
        let api = transport(&config.api_url, config.request_timeout)?;
        let playground = transport(&config.playground_url, config.request_timeout)?;

        let session = SessionManager::new(HttpAuthService::new(api.clone()), store, config.session.clone());
        let api = api.with_unauthorized_signal(session.unauthorized_signal());

        tracing::debug!(api_url = %config.api_url, "scrapedeck client built");
        Ok(ScrapedeckClient {
            session,
            api,
            playground,
            config,
        })
    }
}

fn transport(base_url: &str, timeout: Option<Duration>) -> Result<HttpTransport, ScrapedeckError> {
    let mut builder = HttpTransport::builder().base_url(base_url);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    Ok(builder.build()?)
}

/// A Scrapedeck client with a managed auth session.
///
/// Cheap to clone; clones share the session and connection pools.
pub struct ScrapedeckClient<S: TokenStore = FileStore> {
    pub(crate) session: SessionManager<HttpAuthService, S>,
    /// API transport wired to the session's unauthorized signal.
    pub(crate) api: HttpTransport,
    pub(crate) playground: HttpTransport,
    config: ClientConfig,
}

impl<S: TokenStore> Clone for ScrapedeckClient<S> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            api: self.api.clone(),
            playground: self.playground.clone(),
            config: self.config.clone(),
        }
    }
}

impl ScrapedeckClient<FileStore> {
    /// Creates a new builder.
    pub fn builder() -> ScrapedeckClientBuilder {
        ScrapedeckClientBuilder::new()
    }
}

impl<S: TokenStore> ScrapedeckClient<S> {
    /// Restores the stored session, if any. Call once at startup.
    pub async fn initialize(&self) {
        self.session.initialize().await;
    }

    /// Stops background timers. Stored tokens are kept for the next run.
    pub async fn shutdown(&self) {
        self.session.dispose().await;
    }

    /// Login, signup, logout and token state.
    pub fn session(&self) -> &SessionManager<HttpAuthService, S> {
        &self.session
    }

    /// The unauthenticated auth endpoints (verification, password reset).
    pub fn auth(&self) -> &HttpAuthService {
        self.session.auth()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl<S: TokenStore> fmt::Debug for ScrapedeckClient<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrapedeckClient")
            .field("api", &self.api)
            .field("playground", &self.playground)
            .field("session", &self.session)
            .finish()
    }
}
