use chrono::{DateTime, Utc};
use openidconnect::core::{CoreIdToken, CoreIdTokenClaims};
use serde::Serialize;

/// Authenticated user backed by a validated ID token
#[derive(Debug, Clone, Serialize)]
pub struct OidcPrincipal {
    pub registration_id: String,
    pub subject: String,
    pub issuer: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub authenticated_at: DateTime<Utc>,
    #[serde(skip)]
    id_token: Option<String>,
    #[serde(skip)]
    nonce: Option<String>,
}

impl OidcPrincipal {
    pub fn new(
        registration_id: impl Into<String>,
        subject: impl Into<String>,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            registration_id: registration_id.into(),
            subject: subject.into(),
            issuer: issuer.into(),
            name: None,
            email: None,
            authenticated_at: Utc::now(),
            id_token: None,
            nonce: None,
        }
    }

    /// Build the principal from an ID token whose claims were already verified
    pub fn from_id_token(
        registration_id: &str,
        id_token: &CoreIdToken,
        claims: &CoreIdTokenClaims,
    ) -> Self {
        let mut principal = Self::new(
            registration_id,
            claims.subject().as_str(),
            claims.issuer().url().as_str(),
        )
        .with_id_token(id_token.to_string());

        principal.name = claims
            .name()
            .and_then(|n| n.get(None))
            .map(|n| n.to_string());
        principal.email = claims.email().map(|e| e.to_string());
        principal.nonce = claims.nonce().map(|n| n.secret().clone());

        principal
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    pub fn with_id_token(mut self, id_token: impl Into<String>) -> Self {
        self.id_token = Some(id_token.into());
        self
    }

    /// The `nonce` claim of the ID token
    pub fn nonce(&self) -> Option<&str> {
        self.nonce.as_deref()
    }

    /// The raw ID token (JWT)
    pub fn id_token(&self) -> Option<&str> {
        self.id_token.as_deref()
    }

    /// Name shown to the user, falling back to the email then the subject
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or(&self.subject)
    }
}
