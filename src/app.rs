// src/app.rs

use axum::{
    Router,
    extract::FromRef,
    routing::get,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::extractors::SessionClaims;
use crate::auth::jwt::JwtManager;
use crate::auth::refresh::TokenRefreshService;
use crate::auth::services::AuthService;
use crate::bookmarks::cache::BookmarksCache;
use crate::bookmarks::services::{BookmarkService, RetryPolicy};
use crate::config::Config;
use crate::db::DbPool;
use crate::error::AppError;
use crate::handlers::auth::{callback, login};
use crate::handlers::bookmarks::{get_bookmarks, search_bookmarks};
use crate::handlers::health::health;
use crate::handlers::session::{logout, session};
use crate::provider::XApiClient;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub bookmarks: Arc<BookmarkService>,
    pub jwt: JwtManager,
    /// Require the session cookie subject to match the requested `user_id`
    pub enforce_session: bool,
    pub secure_cookies: bool,
    /// Session cookie lifetime in seconds
    pub session_max_age: i64,
}

impl FromRef<AppState> for JwtManager {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

impl AppState {
    pub fn new(config: &Config, db: DbPool) -> Result<Self, AppError> {
        Self::with_retry(config, db, RetryPolicy::default())
    }

    pub fn with_retry(config: &Config, db: DbPool, retry: RetryPolicy) -> Result<Self, AppError> {
        let client = XApiClient::new(config.provider.clone())
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {e}")))?;
        let jwt = JwtManager::new(&config.jwt_secret, config.session_expiration_hours);

        let auth = AuthService::new(db.clone(), client.clone(), jwt.clone());
        let refresher = TokenRefreshService::new(db.clone(), client.clone());
        let bookmarks = BookmarkService::new(
            db,
            client,
            refresher,
            Arc::new(BookmarksCache::new()),
            retry,
        );

        Ok(Self {
            auth: Arc::new(auth),
            bookmarks: Arc::new(bookmarks),
            session_max_age: jwt.expiration_hours() * 3600,
            jwt,
            enforce_session: config.enforce_session,
            secure_cookies: config.is_production(),
        })
    }

    /// Checks that the caller's session belongs to `user_id`
    pub fn authorize(&self, user_id: &str, claims: &SessionClaims) -> Result<(), AppError> {
        if !self.enforce_session {
            return Ok(());
        }
        match claims.subject() {
            Some(sub) if sub == user_id => Ok(()),
            Some(sub) => {
                tracing::warn!(user_id, session_user = sub, "Session does not match user_id");
                Err(AppError::unauthenticated("Session does not match user_id"))
            }
            None => Err(AppError::unauthenticated("Missing or invalid session, please log in")),
        }
    }
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/x/login", get(login))
        .route("/x/callback", get(callback))
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/bookmarks", get(get_bookmarks))
        .route("/bookmarks/search", get(search_bookmarks))
        .route("/session", get(session))
        .route("/logout", get(logout).post(logout))
}

/// Builds the full application
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth_routes())
        .nest("/api", api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
