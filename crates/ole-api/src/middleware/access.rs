use axum::{
    extract::Request,
    http::Method,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::session::CurrentSession;

pub const LOGIN_PAGE: &str = "/login";

/// Reachable without authentication
const PERMIT_ALL: &[&str] = &["/login", "/logout", "/health", "/favicon.ico"];
const PERMIT_ALL_PREFIXES: &[&str] = &[
    "/login/",
    "/oauth2/authorization/",
    "/js/",
    "/css/",
    "/img/",
    "/webjars/",
];

pub fn is_permitted(path: &str) -> bool {
    PERMIT_ALL.contains(&path) || PERMIT_ALL_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// Send unauthenticated users to the login page
///
/// The requested URL of a GET is saved in the session so the login callback
/// can return the user to it.
pub async fn access_control_middleware(req: Request, next: Next) -> Response {
    if is_permitted(req.uri().path()) {
        return next.run(req).await;
    }

    let Some(current) = req.extensions().get::<CurrentSession>().cloned() else {
        return Redirect::to(LOGIN_PAGE).into_response();
    };

    if current.is_authenticated() {
        return next.run(req).await;
    }

    if req.method() == Method::GET {
        current.save_request(req.uri().to_string());
    }

    tracing::debug!(path = %req.uri().path(), "Unauthenticated request, redirecting to login");
    Redirect::to(LOGIN_PAGE).into_response()
}
