//! The session manager: the single authority over the access/refresh
//! token pair.
//!
//! Everything that needs a bearer token asks the [`SessionManager`]. It
//! acquires tokens (login, signup, rehydration from storage), keeps them
//! fresh (a one-shot refresh timer, a periodic expiry check, and the
//! unauthorized signal), and throws them away (logout).
//!
//! # Concurrency
//!
//! The manager is a cheap handle around shared state behind a Tokio mutex.
//! The lock is never held across a call to the auth service, so a logout
//! can run while a refresh is waiting on the network. Two mechanisms keep
//! that safe:
//!
//! - **Coalescing.** At most one refresh is in flight. It is stored as a
//!   shared future; every concurrent caller awaits the same one, so there
//!   is exactly one network call however the triggers interleave.
//! - **Generations.** Every login, rehydration and logout bumps a
//!   generation counter. A refresh remembers the generation it started in
//!   and drops its result if the session has moved on since.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};

use futures_util::FutureExt as _;
use futures_util::future::{BoxFuture, Shared};
use scrapedeck_protocol::{SignupRequest, TokenPair};
use scrapedeck_timer::{PeriodicConfig, Timer};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::signal::{Unauthorized, UnauthorizedEvents, UnauthorizedSignal};
use crate::store::{StorageKey, TokenStore};
use crate::token;
use crate::{AuthService, SessionConfig, SessionError, SessionSnapshot, SessionState, TimerStatus};

const REFRESH_TIMER: &str = "token-refresh";
const VALIDITY_TIMER: &str = "token-validity-check";

type RefreshFuture = Shared<BoxFuture<'static, Option<String>>>;

// ---------------------------------------------------------------------------
// SessionManager
// ---------------------------------------------------------------------------

/// Owns the token lifecycle for one process.
///
/// Clones share the same session. Construct one with [`SessionManager::new`],
/// call [`initialize`](Self::initialize) once at startup, and hand clones
/// to whatever needs tokens.
///
/// ## Lifecycle
///
/// ```text
/// new() ──→ initialize() ──→ [restored | signed out]
///                                  │
///            login() / signup() ───┤
///                                  ▼
///     refresh timer, expiry check, 401 ──→ refresh ──→ [authenticated]
///                                  │                        │
///                                  └──── failure / logout() ┘──→ [signed out]
/// ```
pub struct SessionManager<A: AuthService, S: TokenStore> {
    inner: Arc<Inner<A, S>>,
}

impl<A: AuthService, S: TokenStore> Clone for SessionManager<A, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: AuthService, S: TokenStore> SessionManager<A, S> {
    /// Creates a signed-out manager. Nothing runs until
    /// [`initialize`](Self::initialize) or [`login`](Self::login).
    pub fn new(auth: A, store: S, config: SessionConfig) -> Self {
        let (signal, events) = UnauthorizedSignal::channel();
        let (snapshot, _) = watch::channel(SessionSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                auth,
                store,
                config,
                state: Mutex::new(State::default()),
                snapshot,
                loading: AtomicUsize::new(0),
                signal,
                events: StdMutex::new(Some(events)),
            }),
        }
    }

    /// Restores the session persisted by a previous run.
    ///
    /// - No stored refresh token: stays signed out.
    /// - A stored access token that hasn't expired: adopted as-is, no
    ///   network call.
    /// - Otherwise: one refresh. If that fails the session is cleared.
    ///
    /// Also starts listening for the unauthorized signal.
    pub async fn initialize(&self) {
        let inner = &self.inner;
        let _loading = inner.loading_guard();

        let (refresh_token, access_token) = match inner.read_stored_pair() {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "failed to read stored session, signing out");
                inner.logout().await;
                return;
            }
        };

        let generation = {
            let mut state = inner.state.lock().await;
            inner.ensure_listener(&mut state);

            let Some(refresh_token) = refresh_token else {
                debug!("no stored session");
                inner.publish(&state);
                return;
            };

            match access_token.filter(|t| !token::is_expired(t)) {
                Some(access_token) => {
                    inner.establish(&mut state, access_token, Some(refresh_token));
                    info!("session restored from storage");
                    return;
                }
                None => {
                    state.refresh_token = Some(refresh_token);
                    state.generation
                }
            }
        };

        debug!("stored access token missing or expired, refreshing");
        // A successful refresh starts both timers itself.
        if inner.refresh().await.is_some() {
            info!("session restored by refresh");
        } else {
            inner.logout_if_current(generation).await;
        }
    }

    /// Exchanges credentials for a token pair and starts a session.
    ///
    /// On success both tokens are persisted and both timers started. On
    /// failure the error is returned unchanged and any existing session is
    /// left alone.
    ///
    /// # Errors
    /// - [`SessionError::InvalidResponseFormat`] if the response lacks
    ///   either token.
    /// - Whatever the auth service returned otherwise.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), SessionError> {
        let inner = &self.inner;
        let _loading = inner.loading_guard();
        inner.set_phase(SessionState::Authenticating).await;

        let pair = inner
            .auth
            .login(email, password)
            .await
            .and_then(|response| response.into_pair().ok_or(SessionError::InvalidResponseFormat));

        let mut state = inner.state.lock().await;
        match pair {
            Ok(pair) => {
                inner.persist(&pair);
                inner.establish(&mut state, pair.access_token, Some(pair.refresh_token));
                info!("logged in");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "login failed");
                inner.restore_phase(&mut state);
                Err(e)
            }
        }
    }

    /// Registers an account, then logs in with the same credentials.
    ///
    /// # Errors
    /// The registration error, or any error from the follow-up
    /// [`login`](Self::login).
    pub async fn signup(&self, request: SignupRequest) -> Result<(), SessionError> {
        let inner = &self.inner;
        let _loading = inner.loading_guard();
        inner.set_phase(SessionState::Authenticating).await;

        if let Err(e) = inner.auth.signup(&request).await {
            warn!(error = %e, "signup failed");
            let mut state = inner.state.lock().await;
            inner.restore_phase(&mut state);
            return Err(e);
        }
        info!("account registered");

        self.login(&request.email, &request.password).await
    }

    /// Gets a fresh token pair from the auth service.
    ///
    /// Concurrent calls share one network request and resolve to the same
    /// token. Any failure ends the session and resolves to `None`; nothing
    /// is retried here.
    pub async fn refresh_access_token(&self) -> Option<String> {
        self.inner.refresh().await
    }

    /// The token to attach to an outgoing request.
    ///
    /// Tries, in order: the in-memory token, a still-valid token in
    /// storage, a refresh. `None` means the caller should send the user to
    /// the login page.
    pub async fn get_access_token(&self) -> Option<String> {
        let inner = &self.inner;
        {
            let mut state = inner.state.lock().await;
            if let Some(current) = state.access_token.as_deref().filter(|t| !token::is_expired(t)) {
                return Some(current.to_owned());
            }

            match inner.store.get(StorageKey::AccessToken) {
                Ok(Some(stored)) if !token::is_expired(&stored) => {
                    debug!("adopting access token from storage");
                    inner.adopt(&mut state, stored.clone());
                    return Some(stored);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "failed to read stored access token"),
            }
        }
        inner.refresh().await
    }

    /// Ends the session: cancels both timers, forgets both tokens, and
    /// removes them from storage. Idempotent, never fails.
    pub async fn logout(&self) {
        self.inner.logout().await;
    }

    /// Shuts down background work without touching storage, so the next
    /// process can restore the session. Dropping the last handle does the
    /// same.
    ///
    /// Final: no timer or listener starts again on this manager. A refresh
    /// already on the network still stores its result, so the persisted
    /// pair stays usable, but it schedules nothing.
    pub async fn dispose(&self) {
        let mut state = self.inner.state.lock().await;
        state.disposed = true;
        cancel_timers(&mut state);
        state.in_flight = None;
        if let Some(listener) = state.listener.take() {
            listener.abort();
        }
        debug!("session manager disposed");
    }

    // -- Read-only surface ------------------------------------------------

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.snapshot.borrow().is_authenticated
    }

    /// `true` while initialize, login, signup or a refresh is running.
    pub fn is_loading(&self) -> bool {
        self.inner.loading.load(Ordering::SeqCst) > 0
    }

    /// The in-memory access token, without checking expiry. Use
    /// [`get_access_token`](Self::get_access_token) for requests.
    pub fn access_token(&self) -> Option<String> {
        self.inner.snapshot.borrow().access_token.clone()
    }

    /// Change notifications for UI layers.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshot.subscribe()
    }

    /// A sender to give to anything that makes authenticated requests.
    pub fn unauthorized_signal(&self) -> UnauthorizedSignal {
        self.inner.signal.clone()
    }

    pub async fn timer_status(&self) -> TimerStatus {
        let state = self.inner.state.lock().await;
        TimerStatus {
            refresh_scheduled: state.refresh_timer.as_ref().is_some_and(Timer::is_pending),
            validity_check_running: state.validity_timer.as_ref().is_some_and(Timer::is_pending),
        }
    }

    pub fn auth(&self) -> &A {
        &self.inner.auth
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }
}

impl<A: AuthService, S: TokenStore> fmt::Debug for SessionManager<A, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("snapshot", &*self.inner.snapshot.borrow())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct Inner<A: AuthService, S: TokenStore> {
    auth: A,
    store: S,
    config: SessionConfig,
    state: Mutex<State>,
    snapshot: watch::Sender<SessionSnapshot>,
    /// Depth of running auth operations. Nested operations (signup calling
    /// login) only clear `is_loading` when the outermost one finishes.
    loading: AtomicUsize,
    signal: UnauthorizedSignal,
    /// Taken by the listener task when it starts.
    events: StdMutex<Option<UnauthorizedEvents>>,
}

#[derive(Default)]
struct State {
    access_token: Option<String>,
    refresh_token: Option<String>,
    authenticated: bool,
    phase: SessionState,
    generation: u64,
    refresh_seq: u64,
    in_flight: Option<(u64, RefreshFuture)>,
    /// Set by `dispose`. Blocks timers and the listener from starting.
    disposed: bool,
    refresh_timer: Option<Timer>,
    validity_timer: Option<Timer>,
    listener: Option<JoinHandle<()>>,
}

impl<A: AuthService, S: TokenStore> Inner<A, S> {
    fn loading_guard(&self) -> LoadingGuard<'_> {
        LoadingGuard::enter(&self.loading, &self.snapshot)
    }

    fn publish(&self, state: &State) {
        self.snapshot.send_modify(|snapshot| {
            *snapshot = SessionSnapshot {
                state: state.phase,
                is_authenticated: state.authenticated,
                is_loading: self.loading.load(Ordering::SeqCst) > 0,
                access_token: state.access_token.clone(),
            };
        });
    }

    async fn set_phase(&self, phase: SessionState) {
        let mut state = self.state.lock().await;
        state.phase = phase;
        self.publish(&state);
    }

    /// Puts the phase back after a failed login or signup.
    fn restore_phase(&self, state: &mut State) {
        state.phase = if state.authenticated {
            SessionState::Authenticated
        } else {
            SessionState::Unauthenticated
        };
        self.publish(state);
    }

    /// Reads `(refresh_token, access_token)` from storage. Empty entries
    /// count as missing.
    fn read_stored_pair(&self) -> Result<(Option<String>, Option<String>), SessionError> {
        let refresh = self.store.get(StorageKey::RefreshToken)?.filter(|t| !t.is_empty());
        let access = self.store.get(StorageKey::AccessToken)?.filter(|t| !t.is_empty());
        Ok((refresh, access))
    }

    fn persist(&self, pair: &TokenPair) {
        let writes = [
            (StorageKey::AccessToken, pair.access_token.as_str()),
            (StorageKey::RefreshToken, pair.refresh_token.as_str()),
        ];
        for (key, value) in writes {
            if let Err(e) = self.store.set(key, value) {
                warn!(%key, error = %e, "failed to persist token");
            }
        }
    }

    /// Starts a new session generation around the given tokens.
    fn establish(self: &Arc<Self>, state: &mut State, access: String, refresh: Option<String>) {
        state.generation += 1;
        state.in_flight = None;
        state.access_token = Some(access);
        state.refresh_token = refresh;
        state.authenticated = true;
        state.phase = SessionState::Authenticated;
        self.schedule_refresh(state);
        self.start_validity_check(state);
        self.ensure_listener(state);
        self.publish(state);
    }

    /// Takes over a valid access token found in storage.
    fn adopt(self: &Arc<Self>, state: &mut State, access: String) {
        let refresh = match state.refresh_token.take() {
            Some(t) => Some(t),
            None => self.store.get(StorageKey::RefreshToken).ok().flatten(),
        };
        if state.authenticated {
            state.access_token = Some(access);
            state.refresh_token = refresh;
            self.publish(state);
        } else {
            self.establish(state, access, refresh);
        }
    }

    // -- Refresh ------------------------------------------------------------

    async fn refresh(self: &Arc<Self>) -> Option<String> {
        let pending = {
            let mut state = self.state.lock().await;
            self.pending_refresh(&mut state)
        };
        pending.await
    }

    /// Returns the in-flight refresh, starting one if there is none.
    fn pending_refresh(self: &Arc<Self>, state: &mut State) -> RefreshFuture {
        if let Some((id, pending)) = &state.in_flight {
            debug!(refresh = id, "joining in-flight token refresh");
            return pending.clone();
        }

        state.refresh_seq += 1;
        let id = state.refresh_seq;
        let generation = state.generation;
        state.phase = SessionState::Refreshing;
        self.publish(state);

        let weak = Arc::downgrade(self);
        let pending = async move {
            match weak.upgrade() {
                Some(inner) => inner.run_refresh(id, generation).await,
                None => None,
            }
        }
        .boxed()
        .shared();
        state.in_flight = Some((id, pending.clone()));
        pending
    }

    async fn run_refresh(self: Arc<Self>, id: u64, generation: u64) -> Option<String> {
        let _loading = self.loading_guard();
        trace!(refresh = id, generation, "token refresh started");
        let outcome = self.exchange_refresh_token().await;

        let mut state = self.state.lock().await;
        if state.in_flight.as_ref().is_some_and(|(current, _)| *current == id) {
            state.in_flight = None;
        }
        if state.generation != generation {
            debug!(
                refresh = id,
                generation,
                current = state.generation,
                "discarding refresh result from an ended session"
            );
            return None;
        }

        match outcome {
            Ok(pair) => {
                self.persist(&pair);
                let access = pair.access_token;
                state.access_token = Some(access.clone());
                state.refresh_token = Some(pair.refresh_token);
                state.authenticated = true;
                state.phase = SessionState::Authenticated;
                self.schedule_refresh(&mut state);
                self.ensure_validity_check(&mut state);
                self.ensure_listener(&mut state);
                self.publish(&state);
                info!(refresh = id, "access token refreshed");
                Some(access)
            }
            Err(e) => {
                warn!(refresh = id, error = %e, "token refresh failed, ending session");
                self.clear(&mut state);
                None
            }
        }
    }

    /// The network half of a refresh: resolve the refresh token, call the
    /// auth service, validate the response.
    async fn exchange_refresh_token(&self) -> Result<TokenPair, SessionError> {
        let remembered = self.state.lock().await.refresh_token.clone();
        let refresh_token = match remembered {
            Some(t) => t,
            None => self
                .store
                .get(StorageKey::RefreshToken)?
                .filter(|t| !t.is_empty())
                .ok_or(SessionError::NoRefreshToken)?,
        };

        self.auth
            .refresh(&refresh_token)
            .await?
            .into_pair()
            .ok_or(SessionError::InvalidResponseFormat)
    }

    // -- Logout -------------------------------------------------------------

    async fn logout(&self) {
        let mut state = self.state.lock().await;
        self.clear(&mut state);
    }

    /// Logs out unless the session has already moved on from `generation`.
    async fn logout_if_current(&self, generation: u64) {
        let mut state = self.state.lock().await;
        if state.generation == generation {
            self.clear(&mut state);
        } else {
            debug!(generation, current = state.generation, "skipping logout for an ended session");
        }
    }

    fn clear(&self, state: &mut State) {
        let was_authenticated = state.authenticated;
        cancel_timers(state);
        state.in_flight = None;
        state.access_token = None;
        state.refresh_token = None;
        state.authenticated = false;
        state.phase = SessionState::Unauthenticated;
        state.generation += 1;

        for key in [StorageKey::AccessToken, StorageKey::RefreshToken] {
            if let Err(e) = self.store.remove(key) {
                warn!(%key, error = %e, "failed to remove stored token");
            }
        }
        self.publish(state);

        if was_authenticated {
            info!("logged out");
        }
    }

    // -- Timers -------------------------------------------------------------

    /// (Re)schedules the one-shot refresh `refresh_delay()` from now.
    fn schedule_refresh(self: &Arc<Self>, state: &mut State) {
        if state.disposed {
            return;
        }
        let generation = state.generation;
        let weak = Arc::downgrade(self);
        state.refresh_timer = Some(Timer::once(
            REFRESH_TIMER,
            self.config.refresh_delay(),
            async move {
                let Some(inner) = weak.upgrade() else { return };
                if inner.refresh().await.is_none() {
                    inner.logout_if_current(generation).await;
                }
            },
        ));
    }

    /// (Re)starts the periodic expiry check.
    fn start_validity_check(self: &Arc<Self>, state: &mut State) {
        if state.disposed {
            return;
        }
        let config = PeriodicConfig {
            initial_jitter: self.config.validity_check_jitter,
            ..PeriodicConfig::with_period(self.config.validity_check_interval)
        };
        let weak = Arc::downgrade(self);
        state.validity_timer = Some(Timer::every(VALIDITY_TIMER, config, move || {
            let weak = Weak::clone(&weak);
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.check_validity().await;
                }
            }
        }));
    }

    fn ensure_validity_check(self: &Arc<Self>, state: &mut State) {
        if !state.validity_timer.as_ref().is_some_and(Timer::is_pending) {
            self.start_validity_check(state);
        }
    }

    /// Refreshes if the held access token has expired. Never logs out
    /// directly; a failed refresh does that itself.
    async fn check_validity(self: &Arc<Self>) {
        let expired = {
            let state = self.state.lock().await;
            match state.access_token.as_deref() {
                Some(access) if state.authenticated => token::is_expired(access),
                _ => false,
            }
        };
        if expired {
            debug!("access token expired, refreshing");
            self.refresh().await;
        }
    }

    // -- Unauthorized signal ------------------------------------------------

    /// Spawns the signal listener once. Later calls are no-ops.
    fn ensure_listener(self: &Arc<Self>, state: &mut State) {
        if state.listener.is_some() || state.disposed {
            return;
        }
        let taken = self.events.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(mut events) = taken else { return };

        let weak = Arc::downgrade(self);
        state.listener = Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(inner) = weak.upgrade() else { break };
                inner.handle_unauthorized(event, &mut events).await;
            }
            trace!("unauthorized listener stopped");
        }));
    }

    async fn handle_unauthorized(self: &Arc<Self>, event: Unauthorized, events: &mut UnauthorizedEvents) {
        let generation = {
            let state = self.state.lock().await;
            if !state.authenticated {
                debug!(source = %event.source, "ignoring unauthorized signal while signed out");
                return;
            }
            state.generation
        };

        info!(source = %event.source, "request rejected as unauthorized, refreshing token");
        let refreshed = self.refresh().await;

        let stale = events.drain();
        if stale > 0 {
            debug!(count = stale, "dropped unauthorized signals raised during refresh");
        }
        if refreshed.is_none() {
            self.logout_if_current(generation).await;
        }
    }
}

impl<A: AuthService, S: TokenStore> Drop for Inner<A, S> {
    fn drop(&mut self) {
        if let Some(listener) = self.state.get_mut().listener.take() {
            listener.abort();
        }
    }
}

fn cancel_timers(state: &mut State) {
    if let Some(mut timer) = state.refresh_timer.take() {
        timer.cancel();
    }
    if let Some(mut timer) = state.validity_timer.take() {
        timer.cancel();
    }
}

// ---------------------------------------------------------------------------
// Loading guard
// ---------------------------------------------------------------------------

/// Marks an auth operation as running for as long as it's alive.
struct LoadingGuard<'a> {
    depth: &'a AtomicUsize,
    snapshot: &'a watch::Sender<SessionSnapshot>,
}

impl<'a> LoadingGuard<'a> {
    fn enter(depth: &'a AtomicUsize, snapshot: &'a watch::Sender<SessionSnapshot>) -> Self {
        depth.fetch_add(1, Ordering::SeqCst);
        snapshot.send_modify(|s| s.is_loading = true);
        Self { depth, snapshot }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
        let depth = self.depth;
        self.snapshot.send_modify(|s| s.is_loading = depth.load(Ordering::SeqCst) > 0);
    }
}
