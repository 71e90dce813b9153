use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};
use tracing::warn;

use time;

use crate::clients::MailClient;
use crate::config::{Config, ServerConfig};
use crate::db::Store;
use crate::services::{AccountService, ResetTokenService, SeaOrmAccountService};

pub mod accounts;
mod error;
mod system;
mod types;

pub use error::ApiError;
pub use types::*;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,

    pub accounts: Arc<dyn AccountService>,

    pub server: ServerConfig,
}

pub async fn create_app_state_from_config(config: Config) -> anyhow::Result<Arc<AppState>> {
    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;

    let tokens = if config.security.reset_token_key.is_empty() {
        warn!(
            "security.reset_token_key is not set; reset links will not survive a restart"
        );
        ResetTokenService::with_random_key(config.security.reset_token_max_age_hours)
    } else {
        ResetTokenService::new(
            config.security.reset_token_key.as_bytes().to_vec(),
            config.security.reset_token_max_age_hours,
        )
    };

    let mail = Arc::new(MailClient::new(config.mail.clone()));

    let accounts = Arc::new(SeaOrmAccountService::new(
        store.clone(),
        Arc::new(tokens),
        mail,
        config.security.clone(),
        config.server.public_url.clone(),
    ));

    Ok(Arc::new(AppState {
        store,
        accounts,
        server: config.server,
    }))
}

pub fn router(state: Arc<AppState>) -> Router {
    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(state.server.secure_cookies)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            state.server.session_expiry_minutes,
        )));

    let account_routes = Router::new()
        .route("/signup", post(accounts::signup))
        .route("/login", post(accounts::login))
        .route("/logout", post(accounts::logout))
        .route(
            "/activate/{user_id}/{activation_key}",
            get(accounts::activate),
        )
        .route("/reset_password", post(accounts::request_reset))
        .route(
            "/reset_password_confirm/{uid}/{token}",
            get(accounts::reset_confirm_form).post(accounts::reset_confirm_submit),
        );

    let cors_origins = state.server.cors_allowed_origins.clone();
    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/accounts", account_routes)
        .route("/health", get(system::health))
        .layer(session_layer)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
