//! Session types: configuration, the state machine, and the read-only
//! snapshot handed to UI layers.

use std::time::Duration;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Timing for the session's background work.
///
/// The defaults match the backend: access tokens live 15 minutes and are
/// refreshed 2 minutes before they expire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Assumed lifetime of a freshly issued access token.
    pub token_lifetime: Duration,

    /// How long before `token_lifetime` runs out the scheduled refresh fires.
    pub refresh_margin: Duration,

    /// Cadence of the periodic expiry check.
    pub validity_check_interval: Duration,

    /// Random delay added before the first expiry check.
    pub validity_check_jitter: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_lifetime: Duration::from_secs(15 * 60),
            refresh_margin: Duration::from_secs(2 * 60),
            validity_check_interval: Duration::from_secs(30),
            validity_check_jitter: Duration::from_secs(1),
        }
    }
}

impl SessionConfig {
    /// Delay between establishing a token pair and the scheduled refresh.
    ///
    /// Saturates at zero if the margin is longer than the lifetime.
    pub fn refresh_delay(&self) -> Duration {
        self.token_lifetime.saturating_sub(self.refresh_margin)
    }

    pub fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    pub fn with_validity_check_interval(mut self, interval: Duration) -> Self {
        self.validity_check_interval = interval;
        self
    }

    pub fn with_validity_check_jitter(mut self, jitter: Duration) -> Self {
        self.validity_check_jitter = jitter;
        self
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Where the session is in its lifecycle.
///
/// ```text
///                 login/signup              success
/// Unauthenticated ───────────→ Authenticating ──────→ Authenticated
///       ↑                           │                   │      ↑
///       │          failure          │   timer / 401 /   │      │ success
///       ├───────────────────────────┘   expired token   ▼      │
///       │                                           Refreshing ┘
///       └──────────────── failure (logout) ─────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No usable token. Terminal until the next login or signup.
    #[default]
    Unauthenticated,

    /// A login or signup is waiting on the auth service.
    Authenticating,

    /// A valid access token is held.
    Authenticated,

    /// A refresh is waiting on the auth service.
    Refreshing,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::Refreshing => "refreshing",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// A point-in-time view of the session for UI layers.
///
/// `is_authenticated` implies `access_token` is present. The reverse does
/// not hold: during a refresh the old token is still visible.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub access_token: Option<String>,
}

impl std::fmt::Debug for SessionSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSnapshot")
            .field("state", &self.state)
            .field("is_authenticated", &self.is_authenticated)
            .field("is_loading", &self.is_loading)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Which background timers are outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimerStatus {
    pub refresh_scheduled: bool,
    pub validity_check_running: bool,
}

impl TimerStatus {
    /// `true` if neither timer is outstanding.
    pub fn is_idle(&self) -> bool {
        !self.refresh_scheduled && !self.validity_check_running
    }
}
