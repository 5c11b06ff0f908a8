use std::fmt;

use oauth2::{EndpointMaybeSet, EndpointNotSet, EndpointSet};
use openidconnect::{
    AuthUrl, ClientId, ClientSecret, EmptyAdditionalProviderMetadata, IssuerUrl,
    JsonWebKeySetUrl, ResponseTypes, TokenUrl,
    core::{
        CoreClient, CoreJsonWebKeySet, CoreJwsSigningAlgorithm, CoreProviderMetadata,
        CoreResponseType, CoreSubjectIdentifierType,
    },
};
use url::Url;

use crate::error::ApiError;

pub type OpenIdClient = CoreClient<
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointMaybeSet,
    EndpointMaybeSet,
>;

/// Redirect URI template used when a registration does not override it
pub const DEFAULT_REDIRECT_URI_TEMPLATE: &str = "{baseUrl}/login/oauth2/code/{registrationId}";

/// A client registered with an OIDC identity provider
#[derive(Clone)]
pub struct ClientRegistration {
    registration_id: String,
    client_id: String,
    scopes: Vec<String>,
    redirect_uri_template: String,
    client: OpenIdClient,
}

impl ClientRegistration {
    /// Create a registration from the provider's discovery document
    pub async fn discover(
        registration_id: impl Into<String>,
        issuer_url: &str,
        client_id: String,
        client_secret: String,
        scopes: Vec<String>,
        http_client: &reqwest::Client,
    ) -> Result<Self, ApiError> {
        let issuer = IssuerUrl::new(issuer_url.to_string())
            .map_err(|e| ApiError::Oidc(format!("Invalid issuer URL: {e}")))?;

        let provider_metadata = CoreProviderMetadata::discover_async(issuer, http_client)
            .await
            .map_err(|e| ApiError::Oidc(format!("Provider discovery failed: {e}")))?;

        let client = CoreClient::from_provider_metadata(
            provider_metadata,
            ClientId::new(client_id.clone()),
            Some(ClientSecret::new(client_secret)),
        );

        Ok(Self::from_client(registration_id, client_id, scopes, client))
    }

    /// Create a registration from explicitly configured endpoints
    #[allow(clippy::too_many_arguments)]
    pub fn from_endpoints(
        registration_id: impl Into<String>,
        issuer_url: &str,
        client_id: String,
        client_secret: Option<String>,
        authorization_uri: &str,
        token_uri: &str,
        jwks: CoreJsonWebKeySet,
        scopes: Vec<String>,
    ) -> Result<Self, ApiError> {
        let issuer = IssuerUrl::new(issuer_url.to_string())
            .map_err(|e| ApiError::Oidc(format!("Invalid issuer URL: {e}")))?;
        let auth_url = AuthUrl::new(authorization_uri.to_string())
            .map_err(|e| ApiError::Oidc(format!("Invalid authorization URI: {e}")))?;
        let token_url = TokenUrl::new(token_uri.to_string())
            .map_err(|e| ApiError::Oidc(format!("Invalid token URI: {e}")))?;

        let jwks_url = JsonWebKeySetUrl::new(format!("{}/jwks", issuer_url.trim_end_matches('/')))
            .map_err(|e| ApiError::Oidc(format!("Invalid issuer URL: {e}")))?;

        // Same shape as a discovered provider, with the key set supplied inline
        let provider_metadata = CoreProviderMetadata::new(
            issuer,
            auth_url,
            jwks_url,
            vec![ResponseTypes::new(vec![CoreResponseType::Code])],
            vec![CoreSubjectIdentifierType::Public],
            vec![CoreJwsSigningAlgorithm::RsaSsaPkcs1V15Sha256],
            EmptyAdditionalProviderMetadata {},
        )
        .set_token_endpoint(Some(token_url))
        .set_jwks(jwks);

        let client = CoreClient::from_provider_metadata(
            provider_metadata,
            ClientId::new(client_id.clone()),
            client_secret.map(ClientSecret::new),
        );

        Ok(Self::from_client(registration_id, client_id, scopes, client))
    }

    fn from_client(
        registration_id: impl Into<String>,
        client_id: String,
        scopes: Vec<String>,
        client: OpenIdClient,
    ) -> Self {
        Self {
            registration_id: registration_id.into(),
            client_id,
            scopes,
            redirect_uri_template: DEFAULT_REDIRECT_URI_TEMPLATE.to_string(),
            client,
        }
    }

    pub fn with_redirect_uri_template(mut self, template: impl Into<String>) -> Self {
        self.redirect_uri_template = template.into();
        self
    }

    pub fn registration_id(&self) -> &str {
        &self.registration_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn client(&self) -> &OpenIdClient {
        &self.client
    }

    pub fn authorization_uri(&self) -> Url {
        self.client.auth_uri().url().clone()
    }

    /// Expand the redirect URI template against the application base URL
    pub fn redirect_uri(&self, base_url: &str) -> String {
        self.redirect_uri_template
            .replace("{baseUrl}", base_url.trim_end_matches('/'))
            .replace("{registrationId}", &self.registration_id)
    }
}

impl fmt::Debug for ClientRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistration")
            .field("registration_id", &self.registration_id)
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field("redirect_uri_template", &self.redirect_uri_template)
            .finish_non_exhaustive()
    }
}

/// Lookup of client registrations by id
pub trait ClientRegistrationRepository: Send + Sync {
    fn find_by_registration_id(&self, registration_id: &str) -> Option<&ClientRegistration>;

    /// All registrations, in configuration order
    fn registrations(&self) -> Vec<&ClientRegistration>;
}

#[derive(Debug, Default)]
pub struct InMemoryClientRegistrationRepository {
    registrations: Vec<ClientRegistration>,
}

impl InMemoryClientRegistrationRepository {
    pub fn new(registrations: Vec<ClientRegistration>) -> Self {
        Self { registrations }
    }
}

impl ClientRegistrationRepository for InMemoryClientRegistrationRepository {
    fn find_by_registration_id(&self, registration_id: &str) -> Option<&ClientRegistration> {
        self.registrations
            .iter()
            .find(|r| r.registration_id == registration_id)
    }

    fn registrations(&self) -> Vec<&ClientRegistration> {
        self.registrations.iter().collect()
    }
}
