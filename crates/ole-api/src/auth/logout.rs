use super::principal::OidcPrincipal;
use crate::session::Session;

/// Hook run after a successful logout, before the session is invalidated
pub trait LogoutSuccessHandler: Send + Sync {
    fn on_logout_success(&self, session: &Session, principal: Option<&OidcPrincipal>);
}

/// Removes the logged out principal's ID token nonce from the session store
#[derive(Debug, Default, Clone, Copy)]
pub struct NonceCleanupLogoutHandler;

impl LogoutSuccessHandler for NonceCleanupLogoutHandler {
    fn on_logout_success(&self, session: &Session, principal: Option<&OidcPrincipal>) {
        let Some(principal) = principal else {
            return;
        };

        if session.nonces().remove_principal(principal) {
            tracing::debug!(subject = %principal.subject, "Removed ID token nonce on logout");
        } else {
            tracing::debug!(
                subject = %principal.subject,
                "No outstanding nonce for principal on logout"
            );
        }
    }
}
