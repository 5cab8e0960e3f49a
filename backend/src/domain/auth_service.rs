//! # Authentication State
//!
//! One process-wide holder of the current identity. Readers take a
//! synchronous snapshot, subscribe to changes, or await the first resolution
//! after startup; nothing polls the identity provider.

use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::integrations::identity::{AuthError, IdentityProvider, Session};
use crate::storage::IdTokenSource;
use shared::{SessionResponse, SignInRequest, User};

#[derive(Debug, Clone, PartialEq)]
pub enum AuthStatus {
    /// The provider has not reported a state yet
    Pending,
    SignedOut,
    SignedIn(Session),
}

#[derive(Clone)]
pub struct AuthState {
    tx: Arc<watch::Sender<AuthStatus>>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AuthStatus::Pending);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> AuthStatus {
        self.tx.borrow().clone()
    }

    pub fn current_user(&self) -> Option<User> {
        match &*self.tx.borrow() {
            AuthStatus::SignedIn(session) => Some(session.user.clone()),
            _ => None,
        }
    }

    pub fn session(&self) -> Option<Session> {
        match &*self.tx.borrow() {
            AuthStatus::SignedIn(session) => Some(session.clone()),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(*self.tx.borrow(), AuthStatus::Pending)
    }

    /// The signed-in user, or `AuthError::NotSignedIn`
    pub fn require_user(&self) -> Result<User, AuthError> {
        self.current_user().ok_or(AuthError::NotSignedIn)
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthStatus> {
        self.tx.subscribe()
    }

    /// Wait until the status leaves `Pending`, then return the user if any
    pub async fn wait_until_resolved(&self) -> Option<User> {
        let mut rx = self.tx.subscribe();
        let resolved = match rx.wait_for(|s| !matches!(s, AuthStatus::Pending)).await {
            Ok(status) => status.clone(),
            Err(_) => return None,
        };
        match resolved {
            AuthStatus::SignedIn(session) => Some(session.user),
            _ => None,
        }
    }

    pub fn set(&self, status: AuthStatus) {
        self.tx.send_replace(status);
    }

    pub fn session_response(&self) -> SessionResponse {
        SessionResponse {
            resolved: self.is_resolved(),
            user: self.current_user(),
        }
    }
}

/// Renew the id token this long before it expires
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Bearer tokens for the document store, taken from the signed-in session.
///
/// A token close to expiry, or one the store rejected, is renewed through the
/// identity provider and the new session is published on `AuthState`. When
/// renewal fails the state moves to `SignedOut`.
#[derive(Clone)]
pub struct SessionTokens {
    provider: Arc<dyn IdentityProvider>,
    state: AuthState,
    renewing: Arc<Mutex<()>>,
}

impl SessionTokens {
    pub fn new(provider: Arc<dyn IdentityProvider>, state: AuthState) -> Self {
        Self {
            provider,
            state,
            renewing: Arc::new(Mutex::new(())),
        }
    }
}

#[async_trait]
impl IdTokenSource for SessionTokens {
    async fn id_token(&self) -> Option<String> {
        let session = self.state.session()?;
        if session.expires_within(chrono::Duration::seconds(EXPIRY_MARGIN_SECS)) {
            return self.renew(&session.id_token).await;
        }
        Some(session.id_token)
    }

    async fn renew(&self, rejected: &str) -> Option<String> {
        // Concurrent callers holding the same stale token share one refresh
        let _guard = self.renewing.lock().await;
        let session = self.state.session()?;
        if session.id_token != rejected {
            return Some(session.id_token);
        }

        match self.provider.refresh_session(&session).await {
            Ok(renewed) => {
                info!("Renewed id token of {}", renewed.user.uid);
                let token = renewed.id_token.clone();
                self.state.set(AuthStatus::SignedIn(renewed));
                Some(token)
            }
            Err(e) => {
                warn!("Could not renew session of {}, signing out: {:#}", session.user.uid, e);
                self.state.set(AuthStatus::SignedOut);
                None
            }
        }
    }
}

/// Drives sign-in and sign-out against the identity provider and publishes the
/// result through `AuthState`
#[derive(Clone)]
pub struct AuthService {
    provider: Arc<dyn IdentityProvider>,
    state: AuthState,
}

impl AuthService {
    pub fn new(provider: Arc<dyn IdentityProvider>, state: AuthState) -> Self {
        Self { provider, state }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// Resolve the startup state from any session the provider kept
    pub async fn restore(&self) {
        match self.provider.restore_session().await {
            Ok(Some(session)) => {
                info!("Restored session for {}", session.user.uid);
                self.state.set(AuthStatus::SignedIn(session));
            }
            Ok(None) => self.state.set(AuthStatus::SignedOut),
            Err(e) => {
                warn!("Could not restore session: {}", e);
                self.state.set(AuthStatus::SignedOut);
            }
        }
    }

    pub async fn sign_in(&self, request: SignInRequest) -> Result<User> {
        info!("Sign-in requested for {}", request.email);
        let session = self.provider.sign_in(&request.email, &request.password).await?;
        let user = session.user.clone();
        self.state.set(AuthStatus::SignedIn(session));
        info!("Signed in as {}", user.uid);
        Ok(user)
    }

    pub async fn sign_out(&self) -> Result<()> {
        if let AuthStatus::SignedIn(session) = self.state.current() {
            self.provider.sign_out(&session).await?;
        }
        self.state.set(AuthStatus::SignedOut);
        info!("Signed out");
        Ok(())
    }
}
