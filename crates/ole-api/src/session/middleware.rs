use std::{ops::Deref, sync::Arc};

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::PrivateCookieJar;

use super::{SESSION_COOKIE, Session, SessionId, create_session_cookie};
use crate::{ApiState, error::ApiError};

/// Paths served without a session (static assets, probes)
const SESSIONLESS_PREFIXES: &[&str] = &["/health", "/css/", "/js/", "/img/", "/webjars/"];

/// The session attached to the current request
///
/// # Example
/// ```
/// use ole_api::{error::ApiError, session::CurrentSession};
///
/// async fn handler(session: CurrentSession) -> Result<String, ApiError> {
///     Ok(format!("{} outstanding nonces", session.nonces().len()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub id: SessionId,
    pub session: Arc<Session>,
}

impl Deref for CurrentSession {
    type Target = Session;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(|| ApiError::Session("No session attached to request".to_string()))
    }
}

/// Attach the caller's session to the request, creating one when needed
///
/// A new session gets its cookie set on the response.
pub async fn session_middleware(
    State(state): State<ApiState>,
    jar: PrivateCookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if SESSIONLESS_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return next.run(req).await;
    }

    let existing = jar.get(SESSION_COOKIE).and_then(|cookie| {
        let id = SessionId::from(cookie.value().to_owned());
        state.sessions.get(&id).map(|session| CurrentSession { id, session })
    });

    let (current, jar) = match existing {
        Some(current) => (current, None),
        None => {
            let (id, session) = state.sessions.create();
            let jar = jar.add(create_session_cookie(&id, &state.environment));
            (CurrentSession { id, session }, Some(jar))
        }
    };

    req.extensions_mut().insert(current);
    let response = next.run(req).await;

    match jar {
        Some(jar) => (jar, response).into_response(),
        None => response,
    }
}
