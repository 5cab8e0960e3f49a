//! Firebase Authentication over the Identity Toolkit REST API.
//!
//! Id tokens last about an hour. The refresh token returned at sign-in is
//! exchanged at the secure token endpoint for a new pair.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{AuthError, IdentityProvider, Session};
use shared::User;

pub const DEFAULT_IDENTITY_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";

pub struct FirebaseIdentity {
    http: reqwest::Client,
    base_url: String,
    secure_token_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    email: Option<String>,
    id_token: String,
    refresh_token: Option<String>,
    expires_in: Option<String>,
}

/// The secure token endpoint answers in snake_case
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: Option<String>,
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn expiry(expires_in: Option<&str>) -> Option<chrono::DateTime<Utc>> {
    let seconds: i64 = expires_in?.trim().parse().ok()?;
    Some(Utc::now() + chrono::Duration::seconds(seconds))
}

async fn failure_reason(response: reqwest::Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorEnvelope>(&text)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| format!("{} {}", status, text))
}

impl FirebaseIdentity {
    pub fn new(base_url: &str, secure_token_url: &str, api_key: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            secure_token_url: secure_token_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentity {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        info!("Signing in {}", email);
        let url = format!("{}/accounts:signInWithPassword", self.base_url);
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "email": email,
                "password": password,
                "returnSecureToken": true,
            }))
            .send()
            .await
            .context("Identity provider unreachable")?;

        if !response.status().is_success() {
            let reason = failure_reason(response).await;
            warn!("Sign-in for {} rejected: {}", email, reason);
            return Err(AuthError::Rejected(reason).into());
        }

        let body: SignInResponse = response.json().await.context("Malformed sign-in response")?;
        Ok(Session {
            user: User {
                uid: body.local_id,
                email: body.email,
            },
            expires_at: expiry(body.expires_in.as_deref()),
            id_token: body.id_token,
            refresh_token: body.refresh_token,
        })
    }

    async fn sign_out(&self, session: &Session) -> Result<()> {
        // Identity Toolkit tokens are stateless; dropping them is the sign-out
        info!("Signing out {}", session.user.uid);
        Ok(())
    }

    async fn refresh_session(&self, session: &Session) -> Result<Session> {
        let Some(refresh_token) = session.refresh_token.as_deref() else {
            return Err(AuthError::Expired("no refresh token".into()).into());
        };
        info!("Refreshing id token of {}", session.user.uid);

        let url = format!("{}/token", self.secure_token_url);
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .send()
            .await
            .context("Secure token service unreachable")?;

        if !response.status().is_success() {
            let reason = failure_reason(response).await;
            warn!("Token refresh for {} rejected: {}", session.user.uid, reason);
            return Err(AuthError::Expired(reason).into());
        }

        let body: RefreshResponse = response.json().await.context("Malformed token refresh response")?;
        if let Some(uid) = &body.user_id {
            if *uid != session.user.uid {
                return Err(AuthError::Expired(format!("token refresh returned user {}", uid)).into());
            }
        }
        Ok(Session {
            user: session.user.clone(),
            expires_at: expiry(body.expires_in.as_deref()),
            id_token: body.id_token,
            refresh_token: Some(body.refresh_token),
        })
    }
}
