//! Development identity used with the in-memory store. Any email with a
//! non-empty password signs in, and the email itself is the uid.

use anyhow::Result;
use async_trait::async_trait;
use log::info;

use super::{AuthError, IdentityProvider, Session};
use shared::User;

#[derive(Debug, Default)]
pub struct LocalIdentity;

#[async_trait]
impl IdentityProvider for LocalIdentity {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::Rejected("MISSING_CREDENTIALS".into()).into());
        }
        info!("Local sign-in for {}", email);
        Ok(Session {
            user: User {
                uid: email.to_lowercase(),
                email: Some(email.to_string()),
            },
            id_token: String::new(),
            refresh_token: None,
            expires_at: None,
        })
    }

    async fn sign_out(&self, _session: &Session) -> Result<()> {
        Ok(())
    }
}
