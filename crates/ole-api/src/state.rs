use std::{path::PathBuf, sync::Arc};

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use crate::{
    ApiConfig,
    auth::{
        logout::{LogoutSuccessHandler, NonceCleanupLogoutHandler},
        registration::{
            ClientRegistration, ClientRegistrationRepository, InMemoryClientRegistrationRepository,
        },
        resolver::{
            AuthorizationRequestResolver, DefaultAuthorizationRequestResolver,
            NonceAugmentingResolver,
        },
    },
    config::Environment,
    error::ApiError,
    session::SessionRegistry,
};

#[derive(Clone)]
pub struct ApiState {
    pub registrations: Arc<dyn ClientRegistrationRepository>,
    pub resolver: Arc<dyn AuthorizationRequestResolver>,
    pub logout_handler: Arc<dyn LogoutSuccessHandler>,
    pub sessions: SessionRegistry,
    pub http_client: reqwest::Client,
    pub cookie_key: Key,
    pub environment: Environment,
    /// Public URL of the application, without trailing slash
    pub base_url: String,
    pub logout_success_url: String,
    pub static_dir: PathBuf,
    pub auto_redirect: bool,
}

impl ApiState {
    pub async fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        // Following redirects on token requests is an SSRF vector
        let http_client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        // Discover the provider's OIDC configuration
        let registration = ClientRegistration::discover(
            config.oidc_registration_id.clone(),
            &config.oidc_issuer_url,
            config.oidc_client_id.clone(),
            config.oidc_client_secret.clone(),
            config.oidc_scopes.clone(),
            &http_client,
        )
        .await?;

        tracing::info!(
            registration_id = %config.oidc_registration_id,
            issuer = %config.oidc_issuer_url,
            "Discovered OIDC provider"
        );

        Ok(Self::with_registrations(
            config,
            vec![registration],
            http_client,
        )?)
    }

    /// Build the state around already constructed client registrations
    pub fn with_registrations(
        config: &ApiConfig,
        registrations: Vec<ClientRegistration>,
        http_client: reqwest::Client,
    ) -> Result<Self, ApiError> {
        let cookie_key = config.cookie_key()?;

        let registrations: Arc<dyn ClientRegistrationRepository> =
            Arc::new(InMemoryClientRegistrationRepository::new(registrations));
        let resolver = NonceAugmentingResolver::new(DefaultAuthorizationRequestResolver::new(
            registrations.clone(),
        ));

        Ok(Self {
            registrations,
            resolver: Arc::new(resolver),
            logout_handler: Arc::new(NonceCleanupLogoutHandler),
            sessions: SessionRegistry::new(chrono::Duration::minutes(
                config.session_timeout_minutes,
            )),
            http_client,
            cookie_key,
            environment: config.env.clone(),
            base_url: config.normalized_base_url(),
            logout_success_url: config.logout_success_url.clone(),
            static_dir: config.static_dir.clone(),
            auto_redirect: config.auto_redirect,
        })
    }
}

impl FromRef<ApiState> for Key {
    fn from_ref(state: &ApiState) -> Self {
        state.cookie_key.clone()
    }
}
