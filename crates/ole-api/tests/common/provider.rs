use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use axum::{Form, Json, Router, extract::State, routing::post};
use chrono::{Duration, Utc};
use openidconnect::{
    Audience, EmptyAdditionalClaims, EndUserEmail, IssuerUrl, JsonWebKeyId, Nonce,
    PrivateSigningKey, StandardClaims, SubjectIdentifier,
    core::{
        CoreIdToken, CoreIdTokenClaims, CoreJsonWebKeySet, CoreJwsSigningAlgorithm,
        CoreRsaPrivateSigningKey,
    },
};
use serde_json::{Value, json};
use tokio::{net::TcpListener, task::JoinHandle};

use super::{CLIENT_ID, ISSUER_URL};

const SIGNING_KEY_PEM: &str = include_str!("../fixtures/provider_key.pem");
const SIGNING_KEY_ID: &str = "test-key";

pub const TEST_SUBJECT: &str = "user-1";
pub const TEST_EMAIL: &str = "user-1@example.com";

#[derive(Default)]
struct Issued {
    nonce: Option<String>,
    token_requests: Vec<HashMap<String, String>>,
}

#[derive(Clone)]
struct ProviderState {
    signing_key: Arc<CoreRsaPrivateSigningKey>,
    issued: Arc<Mutex<Issued>>,
}

/// Token endpoint on an ephemeral port, issuing RS256-signed ID tokens
///
/// The nonce claim of the next ID token is chosen by the test with
/// [`TestProvider::issue_nonce`].
pub struct TestProvider {
    token_uri: String,
    jwks: CoreJsonWebKeySet,
    state: ProviderState,
    server: JoinHandle<()>,
}

impl TestProvider {
    pub async fn start() -> Self {
        let signing_key = CoreRsaPrivateSigningKey::from_pem(
            SIGNING_KEY_PEM,
            Some(JsonWebKeyId::new(SIGNING_KEY_ID.to_string())),
        )
        .expect("Invalid test signing key");
        let jwks = CoreJsonWebKeySet::new(vec![signing_key.as_verification_key()]);

        let state = ProviderState {
            signing_key: Arc::new(signing_key),
            issued: Arc::default(),
        };
        let app = Router::new()
            .route("/as/token", post(token))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test provider");
        let addr = listener.local_addr().expect("Test provider has no address");
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Test provider stopped");
        });

        Self {
            token_uri: format!("http://{addr}/as/token"),
            jwks,
            state,
            server,
        }
    }

    pub fn token_uri(&self) -> &str {
        &self.token_uri
    }

    pub fn jwks(&self) -> CoreJsonWebKeySet {
        self.jwks.clone()
    }

    /// Nonce claim of the ID tokens issued from now on (`None` omits it)
    pub fn issue_nonce(&self, nonce: Option<&str>) {
        self.state.issued.lock().unwrap().nonce = nonce.map(str::to_string);
    }

    /// Form bodies received by the token endpoint
    pub fn token_requests(&self) -> Vec<HashMap<String, String>> {
        self.state.issued.lock().unwrap().token_requests.clone()
    }
}

impl Drop for TestProvider {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn token(
    State(state): State<ProviderState>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    let nonce = {
        let mut issued = state.issued.lock().unwrap();
        issued.token_requests.push(form);
        issued.nonce.clone()
    };

    let id_token = sign_id_token(&state.signing_key, nonce);

    Json(json!({
        "access_token": "test-access-token",
        "token_type": "bearer",
        "expires_in": 300,
        "id_token": id_token.to_string(),
    }))
}

fn sign_id_token(signing_key: &CoreRsaPrivateSigningKey, nonce: Option<String>) -> CoreIdToken {
    let now = Utc::now();
    let claims = CoreIdTokenClaims::new(
        IssuerUrl::new(ISSUER_URL.to_string()).expect("Invalid issuer URL"),
        vec![Audience::new(CLIENT_ID.to_string())],
        now + Duration::minutes(5),
        now,
        StandardClaims::new(SubjectIdentifier::new(TEST_SUBJECT.to_string()))
            .set_email(Some(EndUserEmail::new(TEST_EMAIL.to_string()))),
        EmptyAdditionalClaims {},
    )
    .set_nonce(nonce.map(Nonce::new));

    CoreIdToken::new(
        claims,
        signing_key,
        CoreJwsSigningAlgorithm::RsaSsaPkcs1V15Sha256,
        None,
        None,
    )
    .expect("Failed to sign ID token")
}
