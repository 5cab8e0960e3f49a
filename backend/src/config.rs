//! Startup configuration read from `PLANNER_*` environment variables.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:8080";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Firestore,
    /// Process-local store for development; nothing survives a restart
    Memory,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// OAuth client used to obtain calendar access tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub firebase_project_id: String,
    pub firebase_api_key: String,
    pub google: Option<GoogleOAuthConfig>,
    pub bind_addr: SocketAddr,
    pub store: StoreKind,
    pub allowed_origin: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            firebase_project_id: String::new(),
            firebase_api_key: String::new(),
            google: None,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            store: StoreKind::Memory,
            allowed_origin: DEFAULT_ALLOWED_ORIGIN.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from any name to value lookup. Blank values
    /// count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let store = match get("PLANNER_STORE").as_deref() {
            None | Some("firestore") => StoreKind::Firestore,
            Some("memory") => StoreKind::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "PLANNER_STORE",
                    value: other.to_string(),
                })
            }
        };

        let bind_raw = get("PLANNER_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse::<SocketAddr>().map_err(|_| ConfigError::Invalid {
            name: "PLANNER_BIND_ADDR",
            value: bind_raw.clone(),
        })?;

        let firebase_project_id = get("PLANNER_FIREBASE_PROJECT_ID");
        let firebase_api_key = get("PLANNER_FIREBASE_API_KEY");
        let (firebase_project_id, firebase_api_key) = match store {
            StoreKind::Firestore => (
                firebase_project_id.ok_or(ConfigError::Missing("PLANNER_FIREBASE_PROJECT_ID"))?,
                firebase_api_key.ok_or(ConfigError::Missing("PLANNER_FIREBASE_API_KEY"))?,
            ),
            StoreKind::Memory => (firebase_project_id.unwrap_or_default(), firebase_api_key.unwrap_or_default()),
        };

        let google = match (get("PLANNER_GOOGLE_CLIENT_ID"), get("PLANNER_GOOGLE_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret)) => Some(GoogleOAuthConfig {
                client_id,
                client_secret,
                refresh_token: get("PLANNER_GOOGLE_REFRESH_TOKEN"),
            }),
            (Some(_), None) => return Err(ConfigError::Missing("PLANNER_GOOGLE_CLIENT_SECRET")),
            (None, Some(_)) => return Err(ConfigError::Missing("PLANNER_GOOGLE_CLIENT_ID")),
            (None, None) => None,
        };

        Ok(Self {
            firebase_project_id,
            firebase_api_key,
            google,
            bind_addr,
            store,
            allowed_origin: get("PLANNER_ALLOWED_ORIGIN").unwrap_or_else(|| DEFAULT_ALLOWED_ORIGIN.to_string()),
        })
    }

    /// Whether the identity provider can be reached with this configuration
    pub fn has_firebase(&self) -> bool {
        !self.firebase_project_id.is_empty() && !self.firebase_api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_firestore_requires_project_and_key() {
        assert_eq!(config(&[]), Err(ConfigError::Missing("PLANNER_FIREBASE_PROJECT_ID")));
        assert_eq!(
            config(&[("PLANNER_FIREBASE_PROJECT_ID", "planner-dev")]),
            Err(ConfigError::Missing("PLANNER_FIREBASE_API_KEY"))
        );

        let cfg = config(&[
            ("PLANNER_FIREBASE_PROJECT_ID", "planner-dev"),
            ("PLANNER_FIREBASE_API_KEY", "key"),
        ])
        .unwrap();
        assert_eq!(cfg.store, StoreKind::Firestore);
        assert_eq!(cfg.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(cfg.allowed_origin, DEFAULT_ALLOWED_ORIGIN);
        assert!(cfg.google.is_none());
        assert!(cfg.has_firebase());
    }

    #[test]
    fn test_memory_store_needs_nothing() {
        let cfg = config(&[("PLANNER_STORE", "memory"), ("PLANNER_BIND_ADDR", "0.0.0.0:8000")]).unwrap();
        assert_eq!(cfg.store, StoreKind::Memory);
        assert_eq!(cfg.bind_addr.port(), 8000);
        assert!(!cfg.has_firebase());
    }

    #[test]
    fn test_google_client_must_be_complete() {
        let base = [("PLANNER_STORE", "memory"), ("PLANNER_GOOGLE_CLIENT_ID", "id")];
        assert_eq!(config(&base), Err(ConfigError::Missing("PLANNER_GOOGLE_CLIENT_SECRET")));

        let cfg = config(&[
            ("PLANNER_STORE", "memory"),
            ("PLANNER_GOOGLE_CLIENT_ID", "id"),
            ("PLANNER_GOOGLE_CLIENT_SECRET", "secret"),
            ("PLANNER_GOOGLE_REFRESH_TOKEN", " "),
        ])
        .unwrap();
        let google = cfg.google.unwrap();
        assert_eq!(google.client_id, "id");
        assert_eq!(google.refresh_token, None);
    }

    #[test]
    fn test_invalid_values_are_reported() {
        assert!(matches!(
            config(&[("PLANNER_STORE", "sqlite")]),
            Err(ConfigError::Invalid { name: "PLANNER_STORE", .. })
        ));
        assert!(matches!(
            config(&[("PLANNER_STORE", "memory"), ("PLANNER_BIND_ADDR", "nowhere")]),
            Err(ConfigError::Invalid { name: "PLANNER_BIND_ADDR", .. })
        ));
    }
}
