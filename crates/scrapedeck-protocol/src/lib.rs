//! Wire protocol for the Scrapedeck backend.
//!
//! This crate defines the shapes that travel between the client and the
//! backend HTTP API:
//!
//! - **Auth types** ([`Credentials`], [`SignupRequest`], [`RefreshRequest`],
//!   [`TokenResponse`]): credential exchange and token refresh.
//! - **Dashboard types** ([`ApiKey`], [`Profile`], [`PlaygroundRequest`], ...)
//!   for the authenticated CRUD endpoints.
//! - **Errors** ([`ErrorBody`], [`ProtocolError`]): what the backend sends
//!   back when a call fails, and what can go wrong while decoding.
//!
//! # Architecture
//!
//! The protocol layer knows nothing about HTTP or sessions. It only knows
//! how requests and responses are shaped and how to (de)serialize them.
//!
//! ```text
//! Transport (HTTP) → Protocol (typed bodies) → Session (token lifecycle)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{decode, encode};
pub use error::ProtocolError;
pub use types::{
    ApiKey, Credentials, EmailRequest, ErrorBody, NewApiKey, PasswordChange,
    PlaygroundRequest, PlaygroundResponse, Profile, ProfileUpdate,
    RefreshRequest, SignupRequest, TokenPair, TokenResponse,
};
