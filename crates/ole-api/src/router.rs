use axum::{
    Router,
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::get,
};
use tower_http::services::ServeDir;

use crate::{
    auth,
    middleware::{access::access_control_middleware, csrf::csrf_middleware},
    session::session_middleware,
    state::ApiState,
};

/// Directories of `static_dir` served as public assets
const STATIC_ASSET_DIRS: &[&str] = &["css", "js", "img", "webjars"];

/// Application routes behind the session, CSRF and access control layers
///
/// Layers run outermost first: the session is attached, then CSRF tokens are
/// checked, then unauthenticated users are sent to the login page.
pub fn router(state: &ApiState) -> Router<ApiState> {
    let mut router = Router::new()
        .route("/health", get(health))
        .merge(auth::routes());

    for dir in STATIC_ASSET_DIRS {
        router = router.nest_service(
            &format!("/{dir}"),
            ServeDir::new(state.static_dir.join(dir)),
        );
    }

    router
        .fallback(handler_404)
        .layer(from_fn(access_control_middleware))
        .layer(from_fn_with_state(state.clone(), csrf_middleware))
        .layer(from_fn_with_state(state.clone(), session_middleware))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn handler_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        "The requested resource was not found",
    )
}
