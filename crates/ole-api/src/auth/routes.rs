use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, Uri, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::PrivateCookieJar;
use oauth2::{AuthorizationCode, PkceCodeVerifier};
use openidconnect::{RedirectUrl, TokenResponse};
use serde::Deserialize;

use super::{
    nonce::id_token_nonce_verifier,
    pages::{self, LoginBanner},
    principal::OidcPrincipal,
    request::{AuthorizationRequest, CODE_VERIFIER_ATTRIBUTE, REGISTRATION_ID_ATTRIBUTE},
    resolver::RequestContext,
};
use crate::{
    ApiState,
    error::ApiError,
    metrics::{AuthEvent, record_auth_event},
    middleware::{access::LOGIN_PAGE, csrf::XsrfToken},
    session::{CurrentSession, Session, create_session_cookie, removal_session_cookie},
};

const LOGIN_FAILURE_URL: &str = "/login?error";

pub fn routes() -> Router<ApiState> {
    Router::new()
        .route("/", get(home))
        .route("/login", get(login_page))
        .route("/oauth2/authorization/{registration_id}", get(authorize))
        .route(
            "/login/oauth2/code/{registration_id}",
            get(authorization_callback),
        )
        .route("/logout", post(logout))
        .route("/api/me", get(me))
}

/// Store the request in the session and send the browser to the provider
fn redirect_to_provider(session: &Session, request: AuthorizationRequest) -> Response {
    let location = request.authorization_request_uri();
    session.save_pending_request(request);

    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

#[derive(Debug, Deserialize)]
struct LoginQuery {
    error: Option<String>,
    logout: Option<String>,
}

async fn login_page(
    State(state): State<ApiState>,
    session: CurrentSession,
    Query(query): Query<LoginQuery>,
) -> Response {
    let banner = LoginBanner {
        error: query.error.is_some(),
        logged_out: query.logout.is_some(),
    };
    let registrations = state.registrations.registrations();

    // Banners must stay visible, otherwise a failing login loops
    if state.auto_redirect && !banner.error && !banner.logged_out {
        if let [registration] = registrations.as_slice() {
            let ctx = RequestContext::new(LOGIN_PAGE, &state.base_url, &session);
            if let Some(request) = state
                .resolver
                .resolve_for(&ctx, registration.registration_id())
            {
                return redirect_to_provider(&session, request);
            }
        }
    }

    let ids = registrations
        .iter()
        .map(|r| r.registration_id())
        .collect::<Vec<_>>();

    pages::login_page(&ids, banner).into_response()
}

async fn authorize(
    State(state): State<ApiState>,
    session: CurrentSession,
    uri: Uri,
) -> Result<Response, ApiError> {
    let ctx = RequestContext::new(uri.path(), &state.base_url, &session);

    let request = state.resolver.resolve(&ctx).ok_or_else(|| {
        ApiError::NotFound(format!("No client registration for {}", uri.path()))
    })?;

    tracing::debug!(
        registration_id = request.attribute(REGISTRATION_ID_ATTRIBUTE),
        "Redirecting to identity provider"
    );

    Ok(redirect_to_provider(&session, request))
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

async fn authorization_callback(
    State(state): State<ApiState>,
    session: CurrentSession,
    jar: PrivateCookieJar,
    Path(registration_id): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let principal = match complete_login(&state, &session, &registration_id, query).await {
        Ok(principal) => principal,
        Err(e) => {
            tracing::warn!(error = %e, %registration_id, "Login failed");
            record_auth_event(AuthEvent::Login, &registration_id, false);
            return Redirect::to(LOGIN_FAILURE_URL).into_response();
        }
    };

    tracing::info!(
        %registration_id,
        subject = %principal.subject,
        "User logged in"
    );

    // A second login in the same session retires the first ID token's nonce
    if let Some(previous) = session.principal() {
        session.nonces().remove_principal(&previous);
    }
    session.set_principal(principal);

    // New id after login, the pre-login id may be known to an attacker
    let Some(new_id) = state.sessions.rotate(&session.id) else {
        tracing::warn!(%registration_id, "Session vanished during login");
        record_auth_event(AuthEvent::Login, &registration_id, false);
        return Redirect::to(LOGIN_FAILURE_URL).into_response();
    };
    record_auth_event(AuthEvent::Login, &registration_id, true);

    let target = session.take_saved_request().unwrap_or_else(|| "/".to_string());
    let jar = jar.add(create_session_cookie(&new_id, &state.environment));

    (jar, Redirect::to(&target)).into_response()
}

/// Match the callback to its pending request and finish the login
async fn complete_login(
    state: &ApiState,
    session: &Session,
    registration_id: &str,
    query: CallbackQuery,
) -> Result<OidcPrincipal, ApiError> {
    if let Some(error) = query.error {
        return Err(ApiError::Auth(format!(
            "Provider returned {error}: {}",
            query.error_description.unwrap_or_default()
        )));
    }

    let (Some(code), Some(returned_state)) = (query.code, query.state) else {
        return Err(ApiError::Auth("Missing code or state".to_string()));
    };

    let request = session
        .take_pending_request(&returned_state)
        .ok_or_else(|| ApiError::Auth("No pending authorization request for state".to_string()))?;

    let result = exchange_code(state, session, registration_id, code, &request).await;
    if result.is_err() {
        session.discard_pending_request(&request);
    }
    result
}

/// Redeem `code` for the pending `request` and verify the ID token
async fn exchange_code(
    state: &ApiState,
    session: &Session,
    registration_id: &str,
    code: String,
    request: &AuthorizationRequest,
) -> Result<OidcPrincipal, ApiError> {
    if request.attribute(REGISTRATION_ID_ATTRIBUTE) != Some(registration_id) {
        return Err(ApiError::Auth(
            "Authorization request was issued for another registration".to_string(),
        ));
    }

    let registration = state
        .registrations
        .find_by_registration_id(registration_id)
        .ok_or_else(|| ApiError::NotFound(format!("Client registration {registration_id}")))?;

    let pkce_verifier = request
        .attribute(CODE_VERIFIER_ATTRIBUTE)
        .ok_or_else(|| ApiError::Internal("Pending request has no code verifier".to_string()))?;

    let redirect_uri = RedirectUrl::new(request.redirect_uri().to_string())
        .map_err(|e| ApiError::Internal(format!("Invalid redirect URI: {e}")))?;
    let client = registration.client().clone().set_redirect_uri(redirect_uri);

    // Exchange authorization code for tokens with PKCE verifier
    let token_response = client
        .exchange_code(AuthorizationCode::new(code))
        .map_err(|e| ApiError::Oidc(format!("Token exchange failed: {e}")))?
        .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()))
        .request_async(&state.http_client)
        .await
        .map_err(|e| ApiError::Oidc(format!("Token exchange failed: {e}")))?;

    let id_token = token_response
        .id_token()
        .ok_or_else(|| ApiError::Auth("No ID token in response".to_string()))?;

    // The nonce claim must be one this session issued
    let claims = id_token
        .claims(
            &client.id_token_verifier(),
            id_token_nonce_verifier(session.nonces()),
        )
        .map_err(|e| ApiError::Auth(format!("ID token verification failed: {e}")))?;

    Ok(OidcPrincipal::from_id_token(registration_id, id_token, claims))
}

async fn home(session: CurrentSession, csrf: XsrfToken) -> Result<Html<String>, ApiError> {
    let principal = session
        .principal()
        .ok_or_else(|| ApiError::Auth("Not authenticated".to_string()))?;

    Ok(pages::home_page(&principal, csrf.as_str()))
}

async fn me(session: CurrentSession) -> Result<Json<OidcPrincipal>, ApiError> {
    session
        .principal()
        .map(Json)
        .ok_or_else(|| ApiError::Auth("Not authenticated".to_string()))
}

async fn logout(
    State(state): State<ApiState>,
    session: CurrentSession,
    jar: PrivateCookieJar,
) -> impl IntoResponse {
    let principal = session.principal();
    state
        .logout_handler
        .on_logout_success(&session, principal.as_ref());

    session.clear_principal();
    state.sessions.invalidate(&session.id);

    if let Some(principal) = &principal {
        tracing::info!(subject = %principal.subject, "User logged out");
        record_auth_event(AuthEvent::Logout, &principal.registration_id, true);
    }

    let jar = jar.remove(removal_session_cookie());
    (jar, Redirect::to(&state.logout_success_url))
}
