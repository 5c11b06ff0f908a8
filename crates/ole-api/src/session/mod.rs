//! Server-side browser sessions.
//!
//! A session is identified by an opaque random id carried in the encrypted
//! `SESSION` cookie. Each session owns its own [`NonceStore`], the pending
//! authorization requests of in-flight logins, and the authenticated
//! principal once the login completed.

pub mod middleware;

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock},
};

use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Duration, Utc};

use crate::{
    auth::{
        nonce::{NonceStore, random_token},
        principal::OidcPrincipal,
        request::AuthorizationRequest,
    },
    config::Environment,
};

pub use middleware::{CurrentSession, session_middleware};

pub const SESSION_COOKIE: &str = "SESSION";

/// In-flight authorization requests kept per session (one per open tab)
pub const MAX_PENDING_REQUESTS: usize = 5;

const SESSION_ID_BYTES: usize = 32;

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    fn generate() -> Self {
        Self(random_token(SESSION_ID_BYTES))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// Session ids are credentials, keep them out of logs
impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionId(..)")
    }
}

#[derive(Debug)]
struct SessionData {
    principal: Option<OidcPrincipal>,
    pending_requests: Vec<AuthorizationRequest>,
    saved_request: Option<String>,
    last_accessed: DateTime<Utc>,
}

/// State of one browser session
#[derive(Debug)]
pub struct Session {
    nonces: NonceStore,
    created_at: DateTime<Utc>,
    data: Mutex<SessionData>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            nonces: NonceStore::new(),
            created_at: now,
            data: Mutex::new(SessionData {
                principal: None,
                pending_requests: Vec::new(),
                saved_request: None,
                last_accessed: now,
            }),
        }
    }

    pub fn nonces(&self) -> &NonceStore {
        &self.nonces
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_accessed(&self) -> DateTime<Utc> {
        self.lock().last_accessed
    }

    pub fn touch(&self) {
        self.lock().last_accessed = Utc::now();
    }

    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_accessed() > timeout
    }

    pub fn principal(&self) -> Option<OidcPrincipal> {
        self.lock().principal.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().principal.is_some()
    }

    pub fn set_principal(&self, principal: OidcPrincipal) {
        self.lock().principal = Some(principal);
    }

    pub fn clear_principal(&self) -> Option<OidcPrincipal> {
        self.lock().principal.take()
    }

    /// Keep an authorization request until the provider redirects back
    ///
    /// The oldest request is dropped once [`MAX_PENDING_REQUESTS`] are held,
    /// and its nonce with it.
    pub fn save_pending_request(&self, request: AuthorizationRequest) {
        let evicted = {
            let mut data = self.lock();
            let evicted = (data.pending_requests.len() >= MAX_PENDING_REQUESTS)
                .then(|| data.pending_requests.remove(0));
            data.pending_requests.push(request);
            evicted
        };

        if let Some(evicted) = evicted {
            self.discard_pending_request(&evicted);
            tracing::debug!("Dropped oldest pending authorization request");
        }
    }

    /// Forget the nonce of a request whose login will not complete
    pub fn discard_pending_request(&self, request: &AuthorizationRequest) {
        if let Some(nonce) = request.nonce() {
            self.nonces.remove(nonce);
        }
    }

    /// Remove and return the pending request issued with `state`
    pub fn take_pending_request(&self, state: &str) -> Option<AuthorizationRequest> {
        let mut data = self.lock();
        let index = data
            .pending_requests
            .iter()
            .position(|r| r.state() == state)?;
        Some(data.pending_requests.remove(index))
    }

    pub fn pending_request_count(&self) -> usize {
        self.lock().pending_requests.len()
    }

    /// Remember the URL an unauthenticated user asked for
    pub fn save_request(&self, uri: impl Into<String>) {
        self.lock().saved_request = Some(uri.into());
    }

    pub fn take_saved_request(&self) -> Option<String> {
        self.lock().saved_request.take()
    }

    fn lock(&self) -> MutexGuard<'_, SessionData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// All live sessions, keyed by session id
#[derive(Clone, Debug)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, Arc<Session>>>>,
    timeout: Duration,
}

impl SessionRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn create(&self) -> (SessionId, Arc<Session>) {
        let id = SessionId::generate();
        let session = Arc::new(Session::new());
        self.write().insert(id.clone(), session.clone());

        tracing::debug!("Created session");
        (id, session)
    }

    /// Look up a live session; expired sessions are evicted and reported absent
    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        let session = self.read().get(id).cloned()?;

        if session.is_expired(Utc::now(), self.timeout) {
            self.write().remove(id);
            tracing::debug!("Evicted expired session");
            return None;
        }

        session.touch();
        Some(session)
    }

    pub fn invalidate(&self, id: &SessionId) -> Option<Arc<Session>> {
        let removed = self.write().remove(id);
        if removed.is_some() {
            tracing::debug!("Invalidated session");
        }
        removed
    }

    /// Move a session to a fresh id, keeping its state
    pub fn rotate(&self, id: &SessionId) -> Option<SessionId> {
        let mut sessions = self.write();
        let session = sessions.remove(id)?;
        let new_id = SessionId::generate();
        sessions.insert(new_id.clone(), session);
        Some(new_id)
    }

    /// Drop every expired session, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.write();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired(now, self.timeout));
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Create the session cookie
///
/// Secure (HTTPS-only) outside development. No max-age: the cookie lives
/// as long as the browser session, the server enforces the idle timeout.
pub fn create_session_cookie(id: &SessionId, environment: &Environment) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id.as_str().to_owned()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(!environment.is_development())
        .build()
}

pub fn removal_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}
