// src/auth/services.rs

use chrono::{Duration, Utc};
use x_bookmarks_api::SessionResponse;

use crate::auth::jwt::JwtManager;
use crate::auth::pkce;
use crate::db::DbPool;
use crate::db::models::oauth_state::NewOAuthState;
use crate::db::models::user_token::NewUserToken;
use crate::db::repositories::oauth_state_repository::OAuthStateRepository;
use crate::db::repositories::user_token_repository::UserTokenRepository;
use crate::error::AppError;
use crate::provider::XApiClient;

const STATE_TTL_MINUTES: i64 = 10;

/// Where to send the browser after `GET /auth/x/login`
#[derive(Debug, Clone)]
pub struct LoginRedirect {
    pub url: String,
    pub state: String,
}

/// Result of a completed OAuth callback
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user_id: String,
    pub username: String,
    pub session_token: String,
}

/// OAuth2 PKCE login flow against X
pub struct AuthService {
    db: DbPool,
    client: XApiClient,
    jwt_manager: JwtManager,
}

impl AuthService {
    pub fn new(db: DbPool, client: XApiClient, jwt_manager: JwtManager) -> Self {
        Self {
            db,
            client,
            jwt_manager,
        }
    }

    /// Stores a new pending authorization and builds the authorization URL
    pub fn start_login(&self) -> Result<LoginRedirect, AppError> {
        let now = Utc::now().naive_utc();

        // Expired states would otherwise never be cleaned up
        match OAuthStateRepository::delete_expired(&self.db, now) {
            Ok(0) => {}
            Ok(swept) => tracing::debug!(swept, "Removed expired OAuth states"),
            Err(e) => tracing::warn!("Failed to sweep expired OAuth states: {e}"),
        }

        let state = pkce::generate_state();
        let pair = pkce::generate_pkce();

        OAuthStateRepository::create(
            &self.db,
            &NewOAuthState {
                state: state.clone(),
                code_verifier: pair.verifier,
                created_at: now,
                expires_at: now + Duration::minutes(STATE_TTL_MINUTES),
            },
        )?;

        tracing::info!("OAuth state stored, redirecting to X");

        Ok(LoginRedirect {
            url: self.client.authorization_url(&state, &pair.challenge),
            state,
        })
    }

    /// Validates and consumes `state`, exchanges `code`, fetches the identity
    /// and upserts the token row.
    pub async fn handle_callback(
        &self,
        code: Option<&str>,
        state: Option<&str>,
    ) -> Result<LoginOutcome, AppError> {
        let (Some(code), Some(state)) = (non_empty(code), non_empty(state)) else {
            return Err(AppError::invalid_request(
                "Missing code or state query parameter",
            ));
        };

        let pending = OAuthStateRepository::take(&self.db, state)?.ok_or_else(|| {
            tracing::warn!("Unknown or already consumed OAuth state");
            AppError::InvalidState
        })?;

        if pending.is_expired_at(Utc::now().naive_utc()) {
            tracing::warn!("Expired OAuth state presented");
            return Err(AppError::InvalidState);
        }

        let tokens = self
            .client
            .exchange_code(code, &pending.code_verifier)
            .await
            .map_err(|e| {
                tracing::error!("Token exchange failed: {e}");
                AppError::TokenExchangeFailed {
                    status: e.status().unwrap_or(502),
                    details: e.details(),
                }
            })?;

        let user = self.client.me(&tokens.access_token).await.map_err(|e| {
            tracing::error!("Identity fetch failed: {e}");
            AppError::IdentityFetchFailed(e.details())
        })?;

        let now = Utc::now().naive_utc();
        UserTokenRepository::upsert(
            &self.db,
            &NewUserToken {
                user_id: user.id.clone(),
                access_token: tokens.access_token,
                refresh_token: tokens.refresh_token,
                username: user.username.clone(),
                created_at: now,
                updated_at: now,
            },
        )?;

        let session_token = self
            .jwt_manager
            .generate_session_token(&user.id, &user.username)?;

        tracing::info!(user_id = %user.id, username = %user.username, "X login completed");

        Ok(LoginOutcome {
            user_id: user.id,
            username: user.username,
            session_token,
        })
    }

    /// Authenticated iff a token row with a non-empty access token exists
    pub fn get_session(&self, user_id: &str) -> Result<SessionResponse, AppError> {
        let row = UserTokenRepository::find(&self.db, user_id)?;

        Ok(match row {
            Some(row) if row.has_access_token() => SessionResponse {
                authenticated: true,
                user_id: Some(row.user_id),
                username: Some(row.username),
            },
            _ => SessionResponse {
                authenticated: false,
                user_id: Some(user_id.to_string()),
                username: None,
            },
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
