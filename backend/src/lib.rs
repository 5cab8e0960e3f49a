//! # Planner Backend
//!
//! Server side of the personal finance and todo planner.
//!
//! This crate brings together:
//! - **Domain**: Finance, expense, savings, and todo services
//! - **Storage**: The hosted document store behind the `DocumentStore` seam
//! - **Integrations**: The hosted identity provider and calendar
//! - **IO**: The REST API consumed by the browser client
//!
//! ## Architecture
//!
//! ```text
//! Browser client
//!     ↓
//! IO Layer (REST API)
//!     ↓
//! Domain Layer (services, auth state, sync notifier)
//!     ↓                           ↓
//! Storage Layer (documents)   Integrations (identity, calendar)
//! ```

pub mod config;
pub mod domain;
pub mod integrations;
pub mod io;
pub mod storage;

use anyhow::{Context, Result};
use axum::{
    http::{HeaderValue, Method},
    Router,
};
use log::{info, warn};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::{AppConfig, StoreKind};
use crate::domain::{
    AuthService, AuthState, CalendarSyncService, ExpenseService, FinanceOverview, FinanceService, SavingsService,
    SessionTokens, SyncNotifier, TodoService,
};
use crate::integrations::calendar::{
    google::DEFAULT_CALENDAR_URL, token::DEFAULT_TOKEN_URL, CachedAccessToken, GoogleCalendarClient,
    RefreshTokenExchange,
};
use crate::integrations::identity::firebase::{DEFAULT_IDENTITY_URL, DEFAULT_SECURE_TOKEN_URL};
use crate::integrations::identity::{FirebaseIdentity, IdentityProvider, LocalIdentity};
use crate::io::rest::{auth_apis, expense_apis, finance_apis, savings_apis, todo_apis};
use crate::storage::{firestore::DEFAULT_FIRESTORE_URL, DocumentStore, FirestoreStore, MemoryStore, Repository};

/// Main application state that holds all services
#[derive(Clone)]
pub struct AppState {
    pub auth_service: AuthService,
    pub finance_service: FinanceService,
    pub finance_overview: FinanceOverview,
    pub expense_service: ExpenseService,
    pub savings_service: SavingsService,
    pub todo_service: TodoService,
    pub notifier: SyncNotifier,
    pub allowed_origin: HeaderValue,
}

impl AppState {
    /// Wire every service onto one store, identity provider, and calendar
    pub fn assemble(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        auth: AuthState,
        calendar: CalendarSyncService,
        allowed_origin: HeaderValue,
    ) -> Self {
        let notifier = SyncNotifier::new();
        let finance_service = FinanceService::new(
            Repository::new(store.clone()),
            Repository::new(store.clone()),
            Repository::new(store.clone()),
            auth.clone(),
        );

        Self {
            auth_service: AuthService::new(identity, auth.clone()),
            finance_overview: FinanceOverview::new(finance_service.clone(), auth.clone(), notifier.clone()),
            finance_service,
            expense_service: ExpenseService::new(Repository::new(store.clone()), auth.clone(), notifier.clone()),
            savings_service: SavingsService::new(Repository::new(store.clone()), auth.clone(), notifier.clone()),
            todo_service: TodoService::new(Repository::new(store), auth, calendar),
            notifier,
            allowed_origin,
        }
    }
}

/// Initialize the backend with all required services
pub async fn initialize_backend(config: &AppConfig) -> Result<AppState> {
    let auth = AuthState::new();

    info!("Setting up identity provider");
    let identity: Arc<dyn IdentityProvider> = if config.has_firebase() {
        Arc::new(FirebaseIdentity::new(
            DEFAULT_IDENTITY_URL,
            DEFAULT_SECURE_TOKEN_URL,
            &config.firebase_api_key,
        )?)
    } else {
        warn!("Firebase is not configured; using local sign-in");
        Arc::new(LocalIdentity)
    };

    info!("Setting up document store ({:?})", config.store);
    let store: Arc<dyn DocumentStore> = match config.store {
        StoreKind::Firestore => Arc::new(FirestoreStore::new(
            DEFAULT_FIRESTORE_URL,
            &config.firebase_project_id,
            &config.firebase_api_key,
            Arc::new(SessionTokens::new(identity.clone(), auth.clone())),
        )?),
        StoreKind::Memory => Arc::new(MemoryStore::new()),
    };

    info!("Setting up calendar");
    let calendar = calendar_sync(config)?;

    let allowed_origin = config
        .allowed_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("Invalid allowed origin {:?}", config.allowed_origin))?;

    info!("Setting up application state");
    Ok(AppState::assemble(store, identity, auth, calendar, allowed_origin))
}

fn calendar_sync(config: &AppConfig) -> Result<CalendarSyncService> {
    let Some(google) = &config.google else {
        warn!("Google OAuth client is not configured; calendar sync is disabled");
        return Ok(CalendarSyncService::disabled());
    };
    let Some(refresh_token) = &google.refresh_token else {
        warn!("PLANNER_GOOGLE_REFRESH_TOKEN is not set; calendar sync is disabled");
        return Ok(CalendarSyncService::disabled());
    };

    let exchange = RefreshTokenExchange::new(
        DEFAULT_TOKEN_URL,
        &google.client_id,
        &google.client_secret,
        refresh_token,
    )?;
    let tokens = Arc::new(CachedAccessToken::new(Arc::new(exchange)));
    let client = GoogleCalendarClient::new(DEFAULT_CALENDAR_URL, tokens)?;
    Ok(CalendarSyncService::new(Arc::new(client)))
}

/// Create the Axum router with all routes configured
pub fn create_router(app_state: AppState) -> Router {
    // CORS setup to allow frontend to make requests
    let cors = CorsLayer::new()
        .allow_origin(app_state.allowed_origin.clone())
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let api_routes = Router::new()
        .nest("/auth", auth_apis::router())
        .nest("/finances", finance_apis::router())
        .nest("/expenses", expense_apis::router())
        .nest("/savings", savings_apis::router())
        .nest("/todos", todo_apis::router());

    Router::new()
        .nest("/api", api_routes)
        .layer(cors)
        .with_state(app_state)
}
