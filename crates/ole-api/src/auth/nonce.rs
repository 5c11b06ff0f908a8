//! Replay protection nonces for the OIDC login flow.
//!
//! Every authorization request sent to the identity provider carries a fresh
//! nonce. The provider echoes it back in the ID token, and the callback only
//! accepts ID tokens whose nonce is still outstanding in the session's store.
//! Logging out removes the nonce so the ID token cannot be replayed.

use std::sync::{Mutex, MutexGuard, PoisonError};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use openidconnect::Nonce;
use rand::{RngCore, rngs::OsRng};

use super::principal::OidcPrincipal;
use crate::metrics::{self, NonceEvent};

/// Random bytes per nonce (43 characters once encoded)
pub const NONCE_BYTES: usize = 32;

/// Generate a URL-safe random token from `len` bytes of OS randomness
///
/// Panics if the OS random source is unavailable.
pub fn random_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Outstanding nonces of one session
#[derive(Debug, Default)]
pub struct NonceStore {
    nonces: Mutex<Vec<String>>,
}

impl NonceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a nonce and record it as outstanding
    pub fn generate(&self) -> String {
        let nonce = random_token(NONCE_BYTES);
        let outstanding = {
            let mut nonces = self.lock();
            nonces.push(nonce.clone());
            nonces.len()
        };

        metrics::record_nonce_event(NonceEvent::Generated);
        tracing::debug!(outstanding, "Generated OIDC nonce");

        nonce
    }

    /// Whether `nonce` was generated by this store and not yet removed
    pub fn verify(&self, nonce: &str) -> bool {
        self.lock().iter().any(|n| n == nonce)
    }

    /// Remove `nonce`, returning whether it was outstanding
    pub fn remove(&self, nonce: &str) -> bool {
        let removed = {
            let mut nonces = self.lock();
            match nonces.iter().position(|n| n == nonce) {
                Some(index) => {
                    nonces.remove(index);
                    true
                }
                None => false,
            }
        };

        if removed {
            metrics::record_nonce_event(NonceEvent::Removed);
        }

        removed
    }

    /// Verify the nonce claim of the principal's ID token
    pub fn verify_principal(&self, principal: &OidcPrincipal) -> bool {
        principal.nonce().is_some_and(|nonce| self.verify(nonce))
    }

    /// Remove the nonce claim of the principal's ID token
    pub fn remove_principal(&self, principal: &OidcPrincipal) -> bool {
        principal.nonce().is_some_and(|nonce| self.remove(nonce))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // The list is never left half-updated, so a poisoned lock is still usable
    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.nonces.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// ID token nonce check backed by the session's store
///
/// Rejects ID tokens without a nonce claim and nonces this session never
/// issued (or already removed).
pub fn id_token_nonce_verifier(
    store: &NonceStore,
) -> impl FnOnce(Option<&Nonce>) -> Result<(), String> + '_ {
    move |nonce: Option<&Nonce>| match nonce {
        Some(nonce) if store.verify(nonce.secret()) => Ok(()),
        Some(_) => {
            metrics::record_nonce_event(NonceEvent::Rejected);
            Err("nonce was not issued for this session".to_string())
        }
        None => Err("ID token has no nonce claim".to_string()),
    }
}
