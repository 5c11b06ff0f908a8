use std::path::PathBuf;

use axum_extra::extract::cookie::Key;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Minimum cookie secret length accepted by the private cookie jar
pub const MIN_COOKIE_SECRET_BYTES: usize = 64;

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("COOKIE_SECRET must be at least {MIN_COOKIE_SECRET_BYTES} bytes long")]
    CookieSecretTooShort,
    #[error("Invalid URL in {name}: {source}")]
    InvalidUrl {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },
}

/// Application configuration, read from environment variables
///
/// Every field maps to the upper-cased variable of the same name
/// (`base_url` is read from `BASE_URL`).
#[derive(Clone, Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub env: Environment,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Public URL of this application, used to expand redirect URIs
    pub base_url: String,
    pub cookie_secret: String,
    #[serde(default = "default_session_timeout_minutes")]
    pub session_timeout_minutes: i64,
    #[serde(default = "default_logout_success_url")]
    pub logout_success_url: String,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    /// Skip the login page and go straight to the provider when only one
    /// client registration exists
    #[serde(default)]
    pub auto_redirect: bool,
    #[serde(default = "default_registration_id")]
    pub oidc_registration_id: String,
    pub oidc_issuer_url: String,
    pub oidc_client_id: String,
    pub oidc_client_secret: String,
    #[serde(default = "default_scopes")]
    pub oidc_scopes: Vec<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_session_timeout_minutes() -> i64 {
    30
}

fn default_logout_success_url() -> String {
    "/".to_string()
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_registration_id() -> String {
    "pingone".to_string()
}

fn default_scopes() -> Vec<String> {
    vec![
        "openid".to_string(),
        "profile".to_string(),
        "email".to_string(),
    ]
}

impl ApiConfig {
    /// Load and validate the configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: Self = envy::from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cookie_secret.len() < MIN_COOKIE_SECRET_BYTES {
            return Err(ConfigError::CookieSecretTooShort);
        }

        Url::parse(&self.base_url).map_err(|source| ConfigError::InvalidUrl {
            name: "BASE_URL",
            source,
        })?;
        Url::parse(&self.oidc_issuer_url).map_err(|source| ConfigError::InvalidUrl {
            name: "OIDC_ISSUER_URL",
            source,
        })?;

        Ok(())
    }

    pub fn cookie_key(&self) -> Result<Key, ConfigError> {
        Key::try_from(self.cookie_secret.as_bytes()).map_err(|_| ConfigError::CookieSecretTooShort)
    }

    /// Base URL without a trailing slash
    pub fn normalized_base_url(&self) -> String {
        self.base_url.trim_end_matches('/').to_string()
    }

    pub fn parsed_allowed_origins(&self) -> Vec<String> {
        self.allowed_origins
            .iter()
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect()
    }
}
