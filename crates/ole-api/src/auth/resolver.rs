//! Authorization request resolution.
//!
//! [`DefaultAuthorizationRequestResolver`] turns `/oauth2/authorization/{registrationId}`
//! into a standard Authorization Code request (state + PKCE).
//! [`NonceAugmentingResolver`] wraps it and adds `prompt=login` and a fresh
//! session nonce to every request it produces.

use std::sync::Arc;

use oauth2::{CsrfToken, PkceCodeChallenge};

use super::{
    registration::ClientRegistrationRepository,
    request::{AuthorizationRequest, CODE_VERIFIER_ATTRIBUTE, REGISTRATION_ID_ATTRIBUTE},
};
use crate::session::Session;

pub const DEFAULT_AUTHORIZATION_REQUEST_BASE_URI: &str = "/oauth2/authorization";

/// Forces the provider to re-authenticate instead of reusing its own session
pub const PROMPT_PARAMETER: &str = "prompt";
pub const PROMPT_LOGIN: &str = "login";
pub const NONCE_PARAMETER: &str = "nonce";

/// The incoming request as seen by a resolver
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    pub path: &'a str,
    /// Public base URL of the application, without trailing slash
    pub base_url: &'a str,
    pub session: &'a Session,
}

impl<'a> RequestContext<'a> {
    pub fn new(path: &'a str, base_url: &'a str, session: &'a Session) -> Self {
        Self {
            path,
            base_url,
            session,
        }
    }
}

/// Builds the authorization request for an incoming request, if one applies
pub trait AuthorizationRequestResolver: Send + Sync {
    /// Resolve from the request path alone
    fn resolve(&self, ctx: &RequestContext<'_>) -> Option<AuthorizationRequest>;

    /// Resolve for an explicit client registration
    fn resolve_for(
        &self,
        ctx: &RequestContext<'_>,
        registration_id: &str,
    ) -> Option<AuthorizationRequest>;
}

pub struct DefaultAuthorizationRequestResolver {
    repository: Arc<dyn ClientRegistrationRepository>,
    base_uri: String,
}

impl DefaultAuthorizationRequestResolver {
    pub fn new(repository: Arc<dyn ClientRegistrationRepository>) -> Self {
        Self::with_base_uri(repository, DEFAULT_AUTHORIZATION_REQUEST_BASE_URI)
    }

    pub fn with_base_uri(
        repository: Arc<dyn ClientRegistrationRepository>,
        base_uri: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            base_uri: base_uri.into(),
        }
    }

    /// Extract `{registrationId}` from `{base_uri}/{registrationId}`
    fn registration_id_from_path<'p>(&self, path: &'p str) -> Option<&'p str> {
        let id = path.strip_prefix(&self.base_uri)?.strip_prefix('/')?;
        (!id.is_empty() && !id.contains('/')).then_some(id)
    }
}

impl AuthorizationRequestResolver for DefaultAuthorizationRequestResolver {
    fn resolve(&self, ctx: &RequestContext<'_>) -> Option<AuthorizationRequest> {
        let registration_id = self.registration_id_from_path(ctx.path)?;
        self.resolve_for(ctx, registration_id)
    }

    fn resolve_for(
        &self,
        ctx: &RequestContext<'_>,
        registration_id: &str,
    ) -> Option<AuthorizationRequest> {
        let Some(registration) = self.repository.find_by_registration_id(registration_id) else {
            tracing::debug!(registration_id, "No client registration found");
            return None;
        };

        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let state = CsrfToken::new_random();

        let request = AuthorizationRequest::new(
            registration.authorization_uri(),
            registration.client_id(),
            registration.redirect_uri(ctx.base_url),
            state.secret().clone(),
        )
        .with_scopes(registration.scopes().to_vec())
        .with_additional_parameter("code_challenge", pkce_challenge.as_str())
        .with_additional_parameter("code_challenge_method", pkce_challenge.method().as_str())
        .with_attribute(REGISTRATION_ID_ATTRIBUTE, registration_id)
        .with_attribute(CODE_VERIFIER_ATTRIBUTE, pkce_verifier.secret().clone());

        Some(request)
    }
}

/// Adds `prompt=login` and a session nonce to the requests of `R`
///
/// Requests `R` does not resolve stay unresolved and no nonce is generated.
pub struct NonceAugmentingResolver<R> {
    delegate: R,
}

impl<R> NonceAugmentingResolver<R> {
    pub fn new(delegate: R) -> Self {
        Self { delegate }
    }

    fn augment(
        &self,
        request: AuthorizationRequest,
        ctx: &RequestContext<'_>,
    ) -> AuthorizationRequest {
        let mut parameters = request.additional_parameters().clone();
        parameters.insert(PROMPT_PARAMETER, PROMPT_LOGIN);
        parameters.insert(NONCE_PARAMETER, ctx.session.nonces().generate());

        request.with_additional_parameters(parameters)
    }
}

impl<R: AuthorizationRequestResolver> AuthorizationRequestResolver for NonceAugmentingResolver<R> {
    fn resolve(&self, ctx: &RequestContext<'_>) -> Option<AuthorizationRequest> {
        self.delegate
            .resolve(ctx)
            .map(|request| self.augment(request, ctx))
    }

    fn resolve_for(
        &self,
        ctx: &RequestContext<'_>,
        registration_id: &str,
    ) -> Option<AuthorizationRequest> {
        self.delegate
            .resolve_for(ctx, registration_id)
            .map(|request| self.augment(request, ctx))
    }
}
