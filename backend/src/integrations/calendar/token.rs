//! Access token acquisition for the calendar API.
//!
//! The first token acquired in a process is cached in memory and reused by
//! every later call. Nothing is written to disk, so a restart exchanges again.

use async_trait::async_trait;
use log::{info, warn};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::CalendarError;

pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, CalendarError>;

    /// Forget any cached token so the next call acquires a fresh one
    async fn invalidate(&self) {}
}

/// A token issued out of band
pub struct StaticAccessToken(String);

impl StaticAccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl AccessTokenSource for StaticAccessToken {
    async fn access_token(&self) -> Result<String, CalendarError> {
        Ok(self.0.clone())
    }
}

/// Exchanges a long-lived OAuth refresh token for an access token
pub struct RefreshTokenExchange {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    scope: Option<String>,
}

impl RefreshTokenExchange {
    pub fn new(
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<Self, CalendarError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CalendarError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            refresh_token: refresh_token.to_string(),
        })
    }
}

#[async_trait]
impl AccessTokenSource for RefreshTokenExchange {
    async fn access_token(&self) -> Result<String, CalendarError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];
        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| CalendarError::Token(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(CalendarError::Token(format!("{} {}", status, text)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| CalendarError::Token(e.to_string()))?;
        if let Some(scope) = &token.scope {
            if !scope.split(' ').any(|s| s == CALENDAR_SCOPE) {
                warn!("Access token lacks calendar scope (granted: {})", scope);
            }
        }
        Ok(token.access_token)
    }
}

/// Caches the first token from an inner source for the rest of the process
pub struct CachedAccessToken {
    inner: Arc<dyn AccessTokenSource>,
    cached: Mutex<Option<String>>,
}

impl CachedAccessToken {
    pub fn new(inner: Arc<dyn AccessTokenSource>) -> Self {
        Self {
            inner,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl AccessTokenSource for CachedAccessToken {
    async fn access_token(&self) -> Result<String, CalendarError> {
        // Held across the exchange so concurrent callers share one request
        let mut guard = self.cached.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }
        info!("Acquiring calendar access token");
        let token = self.inner.access_token().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}
