//! Client configuration: defaults, overridable from the environment.

use std::path::PathBuf;
use std::time::Duration;

use scrapedeck_session::SessionConfig;

use crate::ScrapedeckError;

pub const API_URL_VAR: &str = "SCRAPEDECK_API_URL";
pub const PLAYGROUND_URL_VAR: &str = "SCRAPEDECK_PLAYGROUND_URL";
pub const STATE_FILE_VAR: &str = "SCRAPEDECK_STATE_FILE";
pub const REQUEST_TIMEOUT_VAR: &str = "SCRAPEDECK_REQUEST_TIMEOUT_SECS";

/// Everything needed to build a [`ScrapedeckClient`](crate::ScrapedeckClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Main backend: auth, API keys, profile, dashboard, scrape.
    pub api_url: String,

    /// The public scraping playground, served separately.
    pub playground_url: String,

    /// Where [`FileStore`](scrapedeck_session::FileStore) keeps the tokens.
    pub state_file: PathBuf,

    /// Per-request timeout. `None` leaves requests unbounded.
    pub request_timeout: Option<Duration>,

    pub session: SessionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_owned(),
            playground_url: "http://localhost:8001".to_owned(),
            state_file: PathBuf::from(".scrapedeck/session.json"),
            request_timeout: None,
            session: SessionConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults, overridden by any `SCRAPEDECK_*` variables that are set.
    ///
    /// # Errors
    /// [`ScrapedeckError::Config`] if `SCRAPEDECK_REQUEST_TIMEOUT_SECS` isn't
    /// a whole number of seconds.
    pub fn from_env() -> Result<Self, ScrapedeckError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    /// Blank values count as unset. A timeout of `0` disables the timeout.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ScrapedeckError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = get(API_URL_VAR) {
            config.api_url = url;
        }
        if let Some(url) = get(PLAYGROUND_URL_VAR) {
            config.playground_url = url;
        }
        if let Some(path) = get(STATE_FILE_VAR) {
            config.state_file = PathBuf::from(path);
        }
        if let Some(raw) = get(REQUEST_TIMEOUT_VAR) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                ScrapedeckError::Config(format!(
                    "{REQUEST_TIMEOUT_VAR} must be a whole number of seconds, got {raw:?}"
                ))
            })?;
            config.request_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(config)
    }
}
