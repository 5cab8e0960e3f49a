//! Identity provider seam.

pub mod firebase;
pub mod local;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::User;

pub use firebase::FirebaseIdentity;
pub use local::LocalIdentity;

/// A signed-in identity together with the token used for store requests
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: User,
    pub id_token: String,
    /// Long-lived token that renews `id_token`
    pub refresh_token: Option<String>,
    /// When `id_token` stops being accepted. `None` means it does not expire.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Whether `id_token` expires within `margin` of now
    pub fn expires_within(&self, margin: chrono::Duration) -> bool {
        self.expires_at.is_some_and(|at| at - margin <= Utc::now())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthError {
    #[error("no user is signed in")]
    NotSignedIn,
    #[error("sign-in rejected: {0}")]
    Rejected(String),
    #[error("session expired: {0}")]
    Expired(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    async fn sign_out(&self, session: &Session) -> Result<()>;

    /// Exchange the session's refresh token for a new id token
    async fn refresh_session(&self, session: &Session) -> Result<Session> {
        Err(AuthError::Expired(format!("session of {} cannot be renewed", session.user.uid)).into())
    }

    /// A session persisted by the provider from an earlier run, if any
    async fn restore_session(&self) -> Result<Option<Session>> {
        Ok(None)
    }
}
