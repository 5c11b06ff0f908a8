//! Cookie based CSRF protection.
//!
//! The token lives in the `XSRF-TOKEN` cookie, readable by JavaScript so
//! that scripts can echo it in the `X-XSRF-TOKEN` header. HTML forms send it
//! in the `_csrf` field instead. State-changing requests must present the
//! cookie value through one of the two.

use axum::{
    body::{Body, to_bytes},
    extract::{FromRequestParts, Request, State},
    http::{Method, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};

use crate::{ApiState, auth::nonce::random_token, config::Environment, error::ApiError};

pub const CSRF_COOKIE: &str = "XSRF-TOKEN";
pub const CSRF_HEADER: &str = "X-XSRF-TOKEN";
pub const CSRF_PARAMETER: &str = "_csrf";

const CSRF_TOKEN_BYTES: usize = 32;
const MAX_FORM_BYTES: usize = 64 * 1024;

/// CSRF token of the current request, for rendering into forms
#[derive(Debug, Clone)]
pub struct XsrfToken(pub String);

impl XsrfToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S> FromRequestParts<S> for XsrfToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Self>().cloned().ok_or(ApiError::Csrf)
    }
}

/// Create the CSRF cookie (not HttpOnly, scripts need to read it)
pub fn create_csrf_cookie(token: String, environment: &Environment) -> Cookie<'static> {
    Cookie::build((CSRF_COOKIE, token))
        .path("/")
        .http_only(false)
        .same_site(SameSite::Lax)
        .secure(!environment.is_development())
        .build()
}

fn is_safe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

fn is_form(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"))
}

/// Read the token the client presented, buffering form bodies
async fn presented_token(req: Request) -> Result<(Request, Option<String>), ApiError> {
    let header_token = req
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    if header_token.is_some() || !is_form(&req) {
        return Ok((req, header_token));
    }

    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, MAX_FORM_BYTES)
        .await
        .map_err(|_| ApiError::Csrf)?;

    let form_token = url::form_urlencoded::parse(&bytes)
        .find(|(key, _)| key == CSRF_PARAMETER)
        .map(|(_, value)| value.into_owned());

    Ok((Request::from_parts(parts, Body::from(bytes)), form_token))
}

/// Reject unsafe requests without a matching CSRF token, issue the cookie
/// when the client has none
pub async fn csrf_middleware(
    State(state): State<ApiState>,
    jar: CookieJar,
    req: Request,
    next: Next,
) -> Response {
    let expected = jar.get(CSRF_COOKIE).map(|c| c.value().to_owned());

    let mut req = if is_safe_method(req.method()) {
        req
    } else {
        let (req, presented) = match presented_token(req).await {
            Ok(result) => result,
            Err(e) => return e.into_response(),
        };

        let valid = matches!(
            (expected.as_deref(), presented.as_deref()),
            (Some(expected), Some(presented)) if expected == presented
        );
        if !valid {
            tracing::warn!(
                method = %req.method(),
                path = %req.uri().path(),
                "Rejected request with missing or invalid CSRF token"
            );
            return ApiError::Csrf.into_response();
        }
        req
    };

    let (token, issued) = match expected {
        Some(token) => (token, false),
        None => (random_token(CSRF_TOKEN_BYTES), true),
    };
    req.extensions_mut().insert(XsrfToken(token.clone()));

    let response = next.run(req).await;

    if issued {
        let jar = jar.add(create_csrf_cookie(token, &state.environment));
        (jar, response).into_response()
    } else {
        response
    }
}
