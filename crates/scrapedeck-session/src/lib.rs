//! Access/refresh token lifecycle for Scrapedeck.
//!
//! This crate decides whether the user is signed in and which bearer
//! token outgoing requests carry:
//!
//! 1. **Acquisition**: login, signup, and restoring a stored session
//!    ([`SessionManager`] over an [`AuthService`])
//! 2. **Freshness**: a scheduled refresh shortly before expiry, a periodic
//!    expiry check, and refresh-on-401 via the [`UnauthorizedSignal`]
//! 3. **Persistence**: both tokens mirrored into a [`TokenStore`] so a
//!    restart doesn't sign the user out
//!
//! # How it fits in the stack
//!
//! ```text
//! Client facade (above)  ← asks for tokens, raises the unauthorized signal
//!     ↕
//! Session layer (this crate)  ← owns tokens, timers and session state
//!     ↕
//! Protocol layer (below)  ← TokenResponse, SignupRequest wire types
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod manager;
mod session;
mod signal;
mod store;
pub mod token;

pub use auth::AuthService;
pub use error::SessionError;
pub use manager::SessionManager;
pub use session::{SessionConfig, SessionSnapshot, SessionState, TimerStatus};
pub use signal::{Unauthorized, UnauthorizedEvents, UnauthorizedSignal};
pub use store::{FileStore, MemoryStore, StorageKey, TokenStore};
