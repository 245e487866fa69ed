//! Integration tests for the session lifecycle using a scripted auth
//! service.
//!
//! Timer-dependent tests use `start_paused = true`: Tokio auto-advances the
//! clock whenever every task is idle, so a 13 minute sleep runs instantly
//! and deterministically. Expiry checks read the wall clock, which doesn't
//! move, so tokens minted with a future `exp` stay valid throughout.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use scrapedeck_protocol::{SignupRequest, TokenResponse};
use scrapedeck_session::token::{decode_claims, now_secs};
use scrapedeck_session::{
    AuthService, FileStore, MemoryStore, SessionConfig, SessionError, SessionManager,
    SessionSnapshot, SessionState, StorageKey, TokenStore,
};

// =========================================================================
// Scripted auth service
// =========================================================================

type Reply = Result<TokenResponse, SessionError>;

#[derive(Default)]
struct Script {
    logins: Mutex<VecDeque<Reply>>,
    signups: Mutex<VecDeque<Result<(), SessionError>>>,
    refreshes: Mutex<VecDeque<Reply>>,
    login_delay: Mutex<Duration>,
    refresh_delay: Mutex<Duration>,
    login_calls: AtomicUsize,
    signup_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    refresh_tokens_seen: Mutex<Vec<String>>,
}

/// Answers from queues filled by the test. An empty queue answers like a
/// backend rejecting the request.
#[derive(Clone, Default)]
struct MockAuth {
    script: Arc<Script>,
}

impl MockAuth {
    fn on_login(&self, reply: Reply) {
        self.script.logins.lock().unwrap().push_back(reply);
    }

    fn on_signup(&self, reply: Result<(), SessionError>) {
        self.script.signups.lock().unwrap().push_back(reply);
    }

    fn on_refresh(&self, reply: Reply) {
        self.script.refreshes.lock().unwrap().push_back(reply);
    }

    fn delay_logins(&self, delay: Duration) {
        *self.script.login_delay.lock().unwrap() = delay;
    }

    fn delay_refreshes(&self, delay: Duration) {
        *self.script.refresh_delay.lock().unwrap() = delay;
    }

    fn login_calls(&self) -> usize {
        self.script.login_calls.load(Ordering::SeqCst)
    }

    fn signup_calls(&self) -> usize {
        self.script.signup_calls.load(Ordering::SeqCst)
    }

    fn refresh_calls(&self) -> usize {
        self.script.refresh_calls.load(Ordering::SeqCst)
    }

    fn refresh_tokens_seen(&self) -> Vec<String> {
        self.script.refresh_tokens_seen.lock().unwrap().clone()
    }
}

impl AuthService for MockAuth {
    async fn login(&self, _email: &str, _password: &str) -> Result<TokenResponse, SessionError> {
        self.script.login_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.script.login_delay.lock().unwrap();
        let reply = self.script.logins.lock().unwrap().pop_front();
        tokio::time::sleep(delay).await;
        reply.unwrap_or_else(|| Err(SessionError::service(Some(401), "Invalid credentials")))
    }

    async fn signup(&self, _request: &SignupRequest) -> Result<(), SessionError> {
        self.script.signup_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.script.signups.lock().unwrap().pop_front();
        reply.unwrap_or(Ok(()))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, SessionError> {
        self.script.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .refresh_tokens_seen
            .lock()
            .unwrap()
            .push(refresh_token.to_owned());
        let delay = *self.script.refresh_delay.lock().unwrap();
        let reply = self.script.refreshes.lock().unwrap().pop_front();
        tokio::time::sleep(delay).await;
        reply.unwrap_or_else(|| Err(SessionError::service(Some(401), "Invalid refresh token")))
    }
}

// =========================================================================
// Helpers
// =========================================================================

/// An unsigned JWT named `name` (its `sub`) expiring `ttl_secs` from now.
fn jwt(name: &str, ttl_secs: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(
        r#"{{"exp":{},"sub":"{name}"}}"#,
        now_secs() + ttl_secs
    ));
    format!("{header}.{payload}.sig")
}

fn fresh(name: &str) -> String {
    jwt(name, 15 * 60)
}

fn expired(name: &str) -> String {
    jwt(name, -10)
}

/// The `sub` of a token minted by [`jwt`].
fn name_of(token: &str) -> String {
    decode_claims(token)
        .expect("test token decodes")
        .sub
        .expect("test token has sub")
}

fn tokens(access: &str, refresh: &str) -> Reply {
    Ok(TokenResponse::new(access, refresh))
}

fn manager(auth: &MockAuth, store: &MemoryStore) -> SessionManager<MockAuth, MemoryStore> {
    SessionManager::new(auth.clone(), store.clone(), SessionConfig::default())
}

fn stored(store: &impl TokenStore, key: StorageKey) -> Option<String> {
    store.get(key).unwrap()
}

async fn wait_until(
    session: &SessionManager<MockAuth, MemoryStore>,
    condition: impl FnMut(&SessionSnapshot) -> bool,
) {
    let mut rx = session.subscribe();
    tokio::time::timeout(Duration::from_secs(60), rx.wait_for(condition))
        .await
        .expect("session reached expected state")
        .expect("session manager alive");
}

// =========================================================================
// Login & signup
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_login_persists_tokens_and_schedules_refresh() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    auth.on_login(tokens("A1", "R1"));
    let session = manager(&auth, &store);

    session.login("a@b.com", "pw").await.unwrap();

    assert!(session.is_authenticated());
    assert!(!session.is_loading());
    assert_eq!(session.access_token().as_deref(), Some("A1"));
    assert_eq!(stored(&store, StorageKey::AccessToken).as_deref(), Some("A1"));
    assert_eq!(stored(&store, StorageKey::RefreshToken).as_deref(), Some("R1"));

    let timers = session.timer_status().await;
    assert!(timers.refresh_scheduled);
    assert!(timers.validity_check_running);
}

#[tokio::test(start_paused = true)]
async fn test_login_accepts_short_field_names() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    auth.on_login(Ok(serde_json::from_str(r#"{"access":"A1","refresh":"R1"}"#).unwrap()));
    let session = manager(&auth, &store);

    session.login("a@b.com", "pw").await.unwrap();

    assert!(session.is_authenticated());
    assert_eq!(stored(&store, StorageKey::AccessToken).as_deref(), Some("A1"));
    assert_eq!(stored(&store, StorageKey::RefreshToken).as_deref(), Some("R1"));
}

#[tokio::test(start_paused = true)]
async fn test_login_without_token_fields_is_invalid_response_format() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    auth.on_login(Ok(serde_json::from_str(r#"{"message":"welcome"}"#).unwrap()));
    let session = manager(&auth, &store);

    let err = session.login("a@b.com", "pw").await.unwrap_err();

    assert_eq!(err, SessionError::InvalidResponseFormat);
    assert!(!session.is_authenticated());
    assert_eq!(session.snapshot().state, SessionState::Unauthenticated);
    assert!(store.is_empty());
    assert!(session.timer_status().await.is_idle());
}

#[tokio::test(start_paused = true)]
async fn test_login_service_error_propagates_unchanged() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    auth.on_login(Err(SessionError::service(Some(401), "Invalid credentials")));
    let session = manager(&auth, &store);

    let err = session.login("a@b.com", "wrong").await.unwrap_err();

    assert_eq!(err, SessionError::service(Some(401), "Invalid credentials"));
    assert_eq!(err.to_string(), "Invalid credentials");
    assert!(!session.is_authenticated());
    assert!(!session.is_loading());
}

#[tokio::test(start_paused = true)]
async fn test_failed_login_keeps_existing_session() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    auth.on_login(tokens("A1", "R1"));
    auth.on_login(Err(SessionError::service(Some(401), "Invalid credentials")));
    let session = manager(&auth, &store);

    session.login("a@b.com", "pw").await.unwrap();
    session.login("a@b.com", "wrong").await.unwrap_err();

    assert!(session.is_authenticated());
    assert_eq!(session.snapshot().state, SessionState::Authenticated);
    assert_eq!(stored(&store, StorageKey::AccessToken).as_deref(), Some("A1"));
}

#[tokio::test(start_paused = true)]
async fn test_is_loading_while_login_in_flight() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    auth.on_login(tokens("A1", "R1"));
    auth.delay_logins(Duration::from_secs(2));
    let session = manager(&auth, &store);

    let task = tokio::spawn({
        let session = session.clone();
        async move { session.login("a@b.com", "pw").await }
    });
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(session.is_loading());
    assert!(session.snapshot().is_loading);
    assert_eq!(session.snapshot().state, SessionState::Authenticating);

    task.await.unwrap().unwrap();
    assert!(!session.is_loading());
    assert!(!session.snapshot().is_loading);
}

#[tokio::test(start_paused = true)]
async fn test_signup_registers_then_logs_in() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    auth.on_signup(Ok(()));
    auth.on_login(tokens("A1", "R1"));
    let session = manager(&auth, &store);

    session
        .signup(SignupRequest {
            name: "Ada".into(),
            email: "a@b.com".into(),
            password: "pw".into(),
            password_confirm: "pw".into(),
        })
        .await
        .unwrap();

    assert_eq!(auth.signup_calls(), 1);
    assert_eq!(auth.login_calls(), 1);
    assert!(session.is_authenticated());
    assert!(!session.is_loading(), "nested login must not leave loading set");
}

#[tokio::test(start_paused = true)]
async fn test_signup_failure_skips_login() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    auth.on_signup(Err(SessionError::service(Some(400), "Email already registered")));
    let session = manager(&auth, &store);

    let err = session
        .signup(SignupRequest {
            name: "Ada".into(),
            email: "a@b.com".into(),
            password: "pw".into(),
            password_confirm: "pw".into(),
        })
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Email already registered");
    assert_eq!(auth.login_calls(), 0);
    assert!(!session.is_authenticated());
    assert!(!session.is_loading());
}

// =========================================================================
// Logout
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_logout_twice_matches_logout_once() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    auth.on_login(tokens("A1", "R1"));
    let session = manager(&auth, &store);
    session.login("a@b.com", "pw").await.unwrap();

    session.logout().await;
    let once = (session.snapshot(), session.timer_status().await, store.len());
    session.logout().await;
    let twice = (session.snapshot(), session.timer_status().await, store.len());

    assert_eq!(once, twice);
    assert!(!twice.0.is_authenticated);
    assert_eq!(twice.0.access_token, None);
    assert!(twice.1.is_idle());
    assert_eq!(twice.2, 0);
}

#[tokio::test(start_paused = true)]
async fn test_dispose_stops_timers_and_keeps_storage() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    auth.on_login(tokens("A1", "R1"));
    let session = manager(&auth, &store);
    session.login("a@b.com", "pw").await.unwrap();

    session.dispose().await;

    assert!(session.timer_status().await.is_idle());
    assert_eq!(stored(&store, StorageKey::RefreshToken).as_deref(), Some("R1"));
}

#[tokio::test(start_paused = true)]
async fn test_dispose_during_refresh_keeps_timers_stopped() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    auth.on_login(tokens("A1", "R1"));
    auth.on_refresh(tokens("A2", "R2"));
    auth.delay_refreshes(Duration::from_secs(5));
    let session = manager(&auth, &store);
    session.login("a@b.com", "pw").await.unwrap();

    let refreshing = tokio::spawn({
        let session = session.clone();
        async move { session.refresh_access_token().await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    session.dispose().await;
    assert!(session.timer_status().await.is_idle());

    let refreshed = refreshing.await.unwrap();

    assert_eq!(refreshed.as_deref(), Some("A2"));
    assert!(session.timer_status().await.is_idle(), "no timer may restart after dispose");
    assert_eq!(stored(&store, StorageKey::RefreshToken).as_deref(), Some("R2"));

    tokio::time::sleep(Duration::from_secs(30 * 60)).await;
    assert_eq!(auth.refresh_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_login_after_dispose_starts_no_background_work() {
    let auth = MockAuth::default();
    auth.on_login(tokens("A1", "R1"));
    auth.on_login(tokens("A2", "R2"));
    let session = manager(&auth, &MemoryStore::new());
    session.login("a@b.com", "pw").await.unwrap();
    session.dispose().await;

    session.login("a@b.com", "pw").await.unwrap();

    assert!(session.is_authenticated());
    assert!(session.timer_status().await.is_idle());
}

// =========================================================================
// Initialize / reload
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_initialize_without_stored_session_stays_signed_out() {
    let auth = MockAuth::default();
    let session = manager(&auth, &MemoryStore::new());

    session.initialize().await;

    assert!(!session.is_authenticated());
    assert!(!session.is_loading());
    assert_eq!(auth.refresh_calls(), 0);
    assert!(session.timer_status().await.is_idle());
}

#[tokio::test(start_paused = true)]
async fn test_reload_restores_session_without_network_call() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    let access = fresh("A1");
    auth.on_login(tokens(&access, "R1"));

    let first = manager(&auth, &store);
    first.login("a@b.com", "pw").await.unwrap();
    first.dispose().await;
    drop(first);

    let reloaded = manager(&auth, &store);
    reloaded.initialize().await;

    assert!(reloaded.is_authenticated());
    assert_eq!(reloaded.access_token(), Some(access));
    assert_eq!(auth.login_calls(), 1);
    assert_eq!(auth.refresh_calls(), 0);
    let timers = reloaded.timer_status().await;
    assert!(timers.refresh_scheduled && timers.validity_check_running);
}

#[tokio::test(start_paused = true)]
async fn test_reload_from_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let auth = MockAuth::default();
    let access = fresh("A1");
    auth.on_login(tokens(&access, "R1"));

    let first = SessionManager::new(auth.clone(), FileStore::new(&path), SessionConfig::default());
    first.login("a@b.com", "pw").await.unwrap();
    first.dispose().await;
    drop(first);

    let reloaded = SessionManager::new(auth.clone(), FileStore::new(&path), SessionConfig::default());
    reloaded.initialize().await;

    assert!(reloaded.is_authenticated());
    assert_eq!(reloaded.access_token(), Some(access));
    assert_eq!(auth.refresh_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_initialize_with_expired_access_token_refreshes() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    store.set(StorageKey::AccessToken, &expired("A1")).unwrap();
    store.set(StorageKey::RefreshToken, "R1").unwrap();
    auth.on_refresh(tokens(&fresh("A2"), "R2"));
    let session = manager(&auth, &store);

    session.initialize().await;

    assert!(session.is_authenticated());
    assert_eq!(name_of(&session.access_token().unwrap()), "A2");
    assert_eq!(auth.refresh_tokens_seen(), vec!["R1".to_owned()]);
    assert_eq!(stored(&store, StorageKey::RefreshToken).as_deref(), Some("R2"));
    assert!(session.timer_status().await.validity_check_running);
    assert!(!session.is_loading());
}

#[tokio::test(start_paused = true)]
async fn test_initialize_refresh_failure_clears_storage() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    store.set(StorageKey::RefreshToken, "R1").unwrap();
    auth.on_refresh(Err(SessionError::service(Some(401), "Token revoked")));
    let session = manager(&auth, &store);

    session.initialize().await;

    assert!(!session.is_authenticated());
    assert!(!session.is_loading());
    assert!(store.is_empty());
}

// =========================================================================
// Refresh
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_concurrent_refreshes_share_one_request() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    auth.on_login(tokens("A1", "R1"));
    auth.on_refresh(tokens("A2", "R2"));
    auth.on_refresh(tokens("A3", "R3"));
    auth.delay_refreshes(Duration::from_secs(1));
    let session = manager(&auth, &store);
    session.login("a@b.com", "pw").await.unwrap();

    let (first, second) = tokio::join!(
        session.refresh_access_token(),
        session.refresh_access_token()
    );

    assert_eq!(auth.refresh_calls(), 1);
    assert_eq!(first.as_deref(), Some("A2"));
    assert_eq!(first, second);
    assert_eq!(stored(&store, StorageKey::RefreshToken).as_deref(), Some("R2"));
}

#[tokio::test(start_paused = true)]
async fn test_refresh_rejection_logs_out() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    auth.on_login(tokens("A1", "R1"));
    auth.on_refresh(Err(SessionError::service(Some(500), "Failed to refresh token")));
    let session = manager(&auth, &store);
    session.login("a@b.com", "pw").await.unwrap();

    let token = session.refresh_access_token().await;

    assert_eq!(token, None);
    assert!(!session.is_authenticated());
    assert_eq!(stored(&store, StorageKey::AccessToken), None);
    assert_eq!(stored(&store, StorageKey::RefreshToken), None);
    assert!(session.timer_status().await.is_idle());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_response_without_tokens_logs_out() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    auth.on_login(tokens("A1", "R1"));
    auth.on_refresh(Ok(TokenResponse::default()));
    let session = manager(&auth, &store);
    session.login("a@b.com", "pw").await.unwrap();

    assert_eq!(session.refresh_access_token().await, None);
    assert!(!session.is_authenticated());
    assert!(store.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_without_refresh_token_skips_network() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    let session = manager(&auth, &store);

    assert_eq!(session.refresh_access_token().await, None);

    assert_eq!(auth.refresh_calls(), 0);
    assert!(!session.is_authenticated());
    assert_eq!(session.snapshot().state, SessionState::Unauthenticated);
    assert!(!session.is_loading());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_falls_back_to_stored_refresh_token() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    store.set(StorageKey::RefreshToken, "R-stored").unwrap();
    auth.on_refresh(tokens("A2", "R2"));
    let session = manager(&auth, &store);

    assert_eq!(session.refresh_access_token().await.as_deref(), Some("A2"));
    assert_eq!(auth.refresh_tokens_seen(), vec!["R-stored".to_owned()]);
    assert!(session.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn test_logout_during_refresh_discards_result() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    auth.on_login(tokens("A1", "R1"));
    auth.on_refresh(tokens("A2", "R2"));
    auth.delay_refreshes(Duration::from_secs(5));
    let session = manager(&auth, &store);
    session.login("a@b.com", "pw").await.unwrap();

    let task = tokio::spawn({
        let session = session.clone();
        async move { session.refresh_access_token().await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    session.logout().await;

    assert_eq!(task.await.unwrap(), None);
    assert!(!session.is_authenticated());
    assert_eq!(session.access_token(), None);
    assert!(store.is_empty(), "a stale refresh must not repopulate storage");
}

#[tokio::test(start_paused = true)]
async fn test_login_during_refresh_wins_over_stale_result() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    auth.on_login(tokens("A1", "R1"));
    auth.on_login(tokens("A3", "R3"));
    auth.on_refresh(tokens("A2", "R2"));
    auth.delay_refreshes(Duration::from_secs(5));
    let session = manager(&auth, &store);
    session.login("a@b.com", "pw").await.unwrap();

    let task = tokio::spawn({
        let session = session.clone();
        async move { session.refresh_access_token().await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    session.login("a@b.com", "pw").await.unwrap();

    assert_eq!(task.await.unwrap(), None);
    assert!(session.is_authenticated());
    assert_eq!(session.access_token().as_deref(), Some("A3"));
    assert_eq!(stored(&store, StorageKey::RefreshToken).as_deref(), Some("R3"));
}

// =========================================================================
// get_access_token
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_get_access_token_returns_valid_cached_token() {
    let auth = MockAuth::default();
    let access = fresh("A1");
    auth.on_login(tokens(&access, "R1"));
    let session = manager(&auth, &MemoryStore::new());
    session.login("a@b.com", "pw").await.unwrap();

    assert_eq!(session.get_access_token().await, Some(access));
    assert_eq!(auth.refresh_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_get_access_token_refreshes_expired_token() {
    let auth = MockAuth::default();
    auth.on_login(tokens(&expired("A1"), "R1"));
    auth.on_refresh(tokens(&fresh("A2"), "R2"));
    let session = manager(&auth, &MemoryStore::new());
    session.login("a@b.com", "pw").await.unwrap();

    let token = session.get_access_token().await.unwrap();

    assert_eq!(name_of(&token), "A2");
    assert_eq!(auth.refresh_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_get_access_token_adopts_stored_token() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    let access = fresh("A1");
    store.set(StorageKey::AccessToken, &access).unwrap();
    store.set(StorageKey::RefreshToken, "R1").unwrap();
    let session = manager(&auth, &store);

    assert_eq!(session.get_access_token().await, Some(access));
    assert!(session.is_authenticated());
    assert_eq!(auth.refresh_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_adopted_session_reacts_to_unauthorized_signal() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    store.set(StorageKey::AccessToken, &fresh("A1")).unwrap();
    store.set(StorageKey::RefreshToken, "R1").unwrap();
    auth.on_refresh(tokens("A2", "R2"));
    let session = manager(&auth, &store);

    assert!(session.get_access_token().await.is_some());
    assert!(session.is_authenticated());

    session.unauthorized_signal().raise("GET /dashboard/");
    wait_until(&session, |s| s.access_token.as_deref() == Some("A2")).await;

    assert_eq!(auth.refresh_tokens_seen(), vec!["R1".to_owned()]);
    assert!(session.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn test_session_from_stored_refresh_token_reacts_to_unauthorized_signal() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    store.set(StorageKey::RefreshToken, "R1").unwrap();
    auth.on_refresh(tokens("A2", "R2"));
    auth.on_refresh(tokens("A3", "R3"));
    let session = manager(&auth, &store);

    assert_eq!(session.refresh_access_token().await.as_deref(), Some("A2"));
    assert!(session.is_authenticated());

    session.unauthorized_signal().raise("GET /api_keys/get_keys");
    wait_until(&session, |s| s.access_token.as_deref() == Some("A3")).await;

    assert_eq!(auth.refresh_calls(), 2);
    assert_eq!(auth.refresh_tokens_seen(), vec!["R1".to_owned(), "R2".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn test_get_access_token_signed_out_is_none() {
    let auth = MockAuth::default();
    let session = manager(&auth, &MemoryStore::new());

    assert_eq!(session.get_access_token().await, None);
    assert_eq!(auth.refresh_calls(), 0);
}

// =========================================================================
// Timers
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_scheduled_refresh_fires_two_minutes_before_expiry() {
    let auth = MockAuth::default();
    auth.on_login(tokens(&fresh("A1"), "R1"));
    auth.on_refresh(tokens(&fresh("A2"), "R2"));
    let session = manager(&auth, &MemoryStore::new());
    session.login("a@b.com", "pw").await.unwrap();

    tokio::time::sleep(Duration::from_secs(13 * 60 - 1)).await;
    assert_eq!(auth.refresh_calls(), 0, "must not refresh early");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(auth.refresh_calls(), 1);
    assert_eq!(auth.refresh_tokens_seen(), vec!["R1".to_owned()]);
    assert_eq!(name_of(&session.access_token().unwrap()), "A2");
    assert!(session.timer_status().await.refresh_scheduled, "next refresh is scheduled");
}

#[tokio::test(start_paused = true)]
async fn test_scheduled_refresh_failure_logs_out() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    auth.on_login(tokens(&fresh("A1"), "R1"));
    let session = manager(&auth, &store);
    session.login("a@b.com", "pw").await.unwrap();

    tokio::time::sleep(Duration::from_secs(13 * 60 + 1)).await;

    assert_eq!(auth.refresh_calls(), 1);
    assert!(!session.is_authenticated());
    assert!(store.is_empty());
    assert!(session.timer_status().await.is_idle());
}

#[tokio::test(start_paused = true)]
async fn test_validity_check_refreshes_expired_token() {
    let auth = MockAuth::default();
    auth.on_login(tokens(&expired("A1"), "R1"));
    auth.on_refresh(tokens(&fresh("A2"), "R2"));
    let session = manager(&auth, &MemoryStore::new());
    session.login("a@b.com", "pw").await.unwrap();

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(auth.refresh_calls(), 0);

    // 30s period plus at most 1s of start jitter.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(auth.refresh_calls(), 1);
    assert_eq!(name_of(&session.access_token().unwrap()), "A2");

    // The new token is valid, so later checks stay quiet.
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(auth.refresh_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_validity_check_leaves_valid_token_alone() {
    let auth = MockAuth::default();
    auth.on_login(tokens(&fresh("A1"), "R1"));
    let session = manager(&auth, &MemoryStore::new());
    session.login("a@b.com", "pw").await.unwrap();

    tokio::time::sleep(Duration::from_secs(5 * 60)).await;

    assert_eq!(auth.refresh_calls(), 0);
    assert!(session.is_authenticated());
}

// =========================================================================
// Unauthorized signal
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_unauthorized_signal_refreshes_session() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    auth.on_login(tokens("A1", "R1"));
    auth.on_refresh(tokens("A2", "R2"));
    let session = manager(&auth, &store);
    session.login("a@b.com", "pw").await.unwrap();

    session.unauthorized_signal().raise("GET /dashboard/");
    wait_until(&session, |s| s.access_token.as_deref() == Some("A2")).await;

    assert!(session.is_authenticated());
    assert_eq!(auth.refresh_tokens_seen(), vec!["R1".to_owned()]);
    assert_eq!(stored(&store, StorageKey::AccessToken).as_deref(), Some("A2"));
    assert_eq!(stored(&store, StorageKey::RefreshToken).as_deref(), Some("R2"));
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_burst_triggers_one_refresh() {
    let auth = MockAuth::default();
    auth.on_login(tokens("A1", "R1"));
    auth.on_refresh(tokens("A2", "R2"));
    auth.on_refresh(tokens("A3", "R3"));
    auth.delay_refreshes(Duration::from_secs(1));
    let session = manager(&auth, &MemoryStore::new());
    session.login("a@b.com", "pw").await.unwrap();

    let signal = session.unauthorized_signal();
    for _ in 0..5 {
        signal.raise("GET /api_keys/get_keys");
    }
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(auth.refresh_calls(), 1);
    assert_eq!(session.access_token().as_deref(), Some("A2"));
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_signal_refresh_failure_logs_out() {
    let auth = MockAuth::default();
    let store = MemoryStore::new();
    auth.on_login(tokens("A1", "R1"));
    auth.on_refresh(Err(SessionError::service(Some(401), "Token revoked")));
    let session = manager(&auth, &store);
    session.login("a@b.com", "pw").await.unwrap();

    session.unauthorized_signal().raise("GET /profile/get_profile");
    wait_until(&session, |s| !s.is_authenticated).await;

    assert!(store.is_empty());
    assert!(session.timer_status().await.is_idle());
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_signal_ignored_while_signed_out() {
    let auth = MockAuth::default();
    let session = manager(&auth, &MemoryStore::new());
    session.initialize().await;

    session.unauthorized_signal().raise("GET /dashboard/");
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(auth.refresh_calls(), 0);
    assert!(!session.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_sees_login_and_logout() {
    let auth = MockAuth::default();
    auth.on_login(tokens("A1", "R1"));
    let session = manager(&auth, &MemoryStore::new());
    let mut rx = session.subscribe();

    session.login("a@b.com", "pw").await.unwrap();
    assert!(rx.has_changed().unwrap());
    assert!(rx.borrow_and_update().is_authenticated);

    session.logout().await;
    assert!(rx.has_changed().unwrap());
    assert!(!rx.borrow_and_update().is_authenticated);
}
