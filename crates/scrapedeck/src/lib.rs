//! # Scrapedeck
//!
//! Client for the Scrapedeck web-scraping platform.
//!
//! The interesting part is the session: [`ScrapedeckClient`] owns a
//! [`SessionManager`](scrapedeck_session::SessionManager) that logs in,
//! persists the token pair, refreshes it before it expires, and recovers
//! from `401` responses on any dashboard call. Everything else is a thin
//! typed wrapper around the backend's JSON endpoints.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scrapedeck::prelude::*;
//!
//! # async fn run() -> Result<(), ScrapedeckError> {
//! let client = ScrapedeckClient::builder()
//!     .config(ClientConfig::from_env()?)
//!     .build()?;
//! client.initialize().await;
//! if !client.session().is_authenticated() {
//!     client.session().login("a@b.com", "pw").await?;
//! }
//! println!("{:#}", client.dashboard().await?);
//! # Ok(())
//! # }
//! ```

mod api;
mod client;
mod config;
mod error;
mod ping;

pub use client::{ScrapedeckClient, ScrapedeckClientBuilder};
pub use config::{
    API_URL_VAR, ClientConfig, PLAYGROUND_URL_VAR, REQUEST_TIMEOUT_VAR, STATE_FILE_VAR,
};
pub use error::ScrapedeckError;
pub use ping::{KEEP_ALIVE_INTERVAL, PING_TIMEOUT, PingOutcome};

pub mod prelude {
    pub use crate::{
        ClientConfig, KEEP_ALIVE_INTERVAL, PingOutcome, ScrapedeckClient, ScrapedeckClientBuilder,
        ScrapedeckError,
    };
    pub use scrapedeck_timer::Timer;
    pub use scrapedeck_protocol::{
        ApiKey, PlaygroundRequest, PlaygroundResponse, Profile, SignupRequest,
    };
    pub use scrapedeck_session::{
        FileStore, MemoryStore, SessionConfig, SessionError, SessionManager, SessionSnapshot,
        SessionState, TokenStore, UnauthorizedSignal,
    };
}
