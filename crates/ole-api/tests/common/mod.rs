mod provider;

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use ole_api::{
    ApiConfig, ApiState,
    auth::{principal::OidcPrincipal, registration::ClientRegistration},
    config::Environment,
    middleware::csrf::{CSRF_COOKIE, CSRF_HEADER},
    session::{SESSION_COOKIE, Session, SessionId},
};
use openidconnect::core::CoreJsonWebKeySet;
use serde::de::DeserializeOwned;
use tower::ServiceExt;
use url::Url;

pub use provider::{TEST_EMAIL, TEST_SUBJECT, TestProvider};

pub const BASE_URL: &str = "http://localhost:8080";
pub const REGISTRATION_ID: &str = "pingone";
pub const CLIENT_ID: &str = "test-client";
pub const ISSUER_URL: &str = "https://auth.example.com/as";
pub const AUTHORIZATION_URI: &str = "https://auth.example.com/as/authorize";
// Nothing listens here, unless a TestProvider is started
pub const TOKEN_URI: &str = "http://127.0.0.1:9/as/token";

const COOKIE_SECRET: &str =
    "test_cookie_secret_minimum_64_characters_long_for_secure_encryption";

pub fn static_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../static")
}

/// Client registration with explicit endpoints, no discovery
pub fn test_registration(
    registration_id: &str,
    token_uri: &str,
    jwks: CoreJsonWebKeySet,
) -> ClientRegistration {
    ClientRegistration::from_endpoints(
        registration_id,
        ISSUER_URL,
        CLIENT_ID.to_string(),
        Some("test-secret".to_string()),
        AUTHORIZATION_URI,
        token_uri,
        jwks,
        vec!["openid".to_string(), "profile".to_string()],
    )
    .expect("Failed to build test registration")
}

/// Test state builder for creating an ApiState without a provider
pub struct TestStateBuilder {
    registration_ids: Vec<String>,
    token_uri: String,
    jwks: CoreJsonWebKeySet,
    auto_redirect: bool,
    logout_success_url: String,
}

impl TestStateBuilder {
    pub fn new() -> Self {
        Self {
            registration_ids: vec![REGISTRATION_ID.to_string()],
            token_uri: TOKEN_URI.to_string(),
            jwks: CoreJsonWebKeySet::new(Vec::new()),
            auto_redirect: false,
            logout_success_url: "/".to_string(),
        }
    }

    pub fn auto_redirect(mut self, enabled: bool) -> Self {
        self.auto_redirect = enabled;
        self
    }

    pub fn logout_success_url(mut self, url: &str) -> Self {
        self.logout_success_url = url.to_string();
        self
    }

    /// Redeem codes at `provider` and trust its signing key
    pub fn provider(mut self, provider: &TestProvider) -> Self {
        self.token_uri = provider.token_uri().to_string();
        self.jwks = provider.jwks();
        self
    }

    pub fn registration_ids(mut self, ids: &[&str]) -> Self {
        self.registration_ids = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn build(self) -> ApiState {
        let config = ApiConfig {
            env: Environment::Development,
            bind_addr: "127.0.0.1:0".to_string(),
            base_url: BASE_URL.to_string(),
            cookie_secret: COOKIE_SECRET.to_string(),
            session_timeout_minutes: 30,
            logout_success_url: self.logout_success_url,
            allowed_origins: Vec::new(),
            static_dir: static_dir(),
            auto_redirect: self.auto_redirect,
            oidc_registration_id: REGISTRATION_ID.to_string(),
            oidc_issuer_url: ISSUER_URL.to_string(),
            oidc_client_id: CLIENT_ID.to_string(),
            oidc_client_secret: "test-secret".to_string(),
            oidc_scopes: vec!["openid".to_string(), "profile".to_string()],
        };

        let registrations = self
            .registration_ids
            .iter()
            .map(|id| test_registration(id, &self.token_uri, self.jwks.clone()))
            .collect();

        let http_client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .expect("Failed to build HTTP client");

        ApiState::with_registrations(&config, registrations, http_client)
            .expect("Failed to build test state")
    }
}

impl Default for TestStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives the router like a browser, keeping cookies between requests
pub struct TestBrowser {
    router: Router,
    state: ApiState,
    cookies: BTreeMap<String, String>,
}

impl TestBrowser {
    pub fn new(state: &ApiState) -> Self {
        Self {
            router: ole_api::router::router(state).with_state(state.clone()),
            state: state.clone(),
            cookies: BTreeMap::new(),
        }
    }

    /// Send a request with the stored cookies and record the ones set
    pub async fn request(&mut self, builder: axum::http::request::Builder, body: Body) -> TestResponse {
        let builder = if self.cookies.is_empty() {
            builder
        } else {
            builder.header(header::COOKIE, self.cookie_header())
        };
        let request = builder.body(body).expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let headers = response.headers().clone();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        for value in headers.get_all(header::SET_COOKIE) {
            let value = value.to_str().expect("Set-Cookie is not ASCII");
            let cookie = cookie::Cookie::parse(value.to_string()).expect("Invalid Set-Cookie");
            if cookie.value().is_empty() {
                self.cookies.remove(cookie.name());
            } else {
                self.cookies
                    .insert(cookie.name().to_string(), cookie.value().to_string());
            }
        }

        TestResponse {
            status,
            headers,
            body: body_bytes.to_vec(),
        }
    }

    pub async fn get(&mut self, uri: &str) -> TestResponse {
        self.request(Request::builder().method("GET").uri(uri), Body::empty())
            .await
    }

    /// POST without any CSRF token
    pub async fn post(&mut self, uri: &str) -> TestResponse {
        self.request(Request::builder().method("POST").uri(uri), Body::empty())
            .await
    }

    /// POST echoing `token` in the `X-XSRF-TOKEN` header
    pub async fn post_with_csrf_header(&mut self, uri: &str, token: &str) -> TestResponse {
        self.request(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(CSRF_HEADER, token),
            Body::empty(),
        )
        .await
    }

    /// POST an urlencoded form body
    pub async fn post_form(&mut self, uri: &str, form: &str) -> TestResponse {
        self.request(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded"),
            Body::from(form.to_string()),
        )
        .await
    }

    pub fn has_cookie(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    pub fn csrf_token(&self) -> Option<String> {
        self.cookies.get(CSRF_COOKIE).cloned()
    }

    /// Decrypt the private `SESSION` cookie
    pub fn session_id(&self) -> Option<SessionId> {
        let value = self.cookies.get(SESSION_COOKIE)?;
        // Stored as sent, percent-encoded
        let encrypted = cookie::Cookie::parse_encoded(format!("{SESSION_COOKIE}={value}")).ok()?;

        let raw_key = cookie::Key::try_from(self.state.cookie_key.master()).expect("Invalid key");
        let mut raw_jar = cookie::CookieJar::new();
        raw_jar.add_original(encrypted);

        let decrypted = raw_jar.private(&raw_key).get(SESSION_COOKIE)?;
        Some(SessionId::from(decrypted.value().to_string()))
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.state.sessions.get(&self.session_id()?)
    }

    /// Open a session and mark it authenticated as `principal`
    pub async fn login_as(&mut self, principal: OidcPrincipal) -> Arc<Session> {
        self.get("/login").await.assert_status(StatusCode::OK);
        let session = self.session().expect("Login page should create a session");
        session.set_principal(principal);
        session
    }

    fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Test response wrapper
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {}, got {}. Body: {}",
            expected,
            self.status,
            self.text()
        );
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn location(&self) -> &str {
        self.header("location").expect("Response has no Location header")
    }

    /// The Location header parsed as an absolute URL
    pub fn location_url(&self) -> Url {
        Url::parse(self.location()).expect("Location is not an absolute URL")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn json<T: DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).expect("Failed to parse JSON response")
    }
}

/// Value of query parameter `name` in `url`
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

pub fn test_principal(subject: &str) -> OidcPrincipal {
    OidcPrincipal::new(REGISTRATION_ID, subject, ISSUER_URL)
}
