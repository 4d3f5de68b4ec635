// src/handlers/auth.rs

use axum::{
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
};
use x_bookmarks_api::CallbackQuery;

use crate::app::AppState;
use crate::auth::extractors::session_cookie;
use crate::error::AppError;

/// GET /auth/x/login
/// Starts the PKCE flow and redirects the browser to X
pub async fn login(State(state): State<AppState>) -> Result<(StatusCode, HeaderMap), AppError> {
    let redirect = state.auth.start_login()?;

    let mut headers = HeaderMap::new();
    headers.insert(header::LOCATION, HeaderValue::from_str(&redirect.url)?);
    Ok((StatusCode::FOUND, headers))
}

/// GET /auth/x/callback
/// Completes the login, sets the session cookie and hands off to the dashboard
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<(StatusCode, HeaderMap), AppError> {
    if let Some(error) = query.error.as_deref() {
        tracing::warn!(error, "X returned an authorization error");
        return Err(AppError::invalid_request(format!(
            "Authorization was not granted: {error}"
        )));
    }

    let outcome = state
        .auth
        .handle_callback(query.code.as_deref(), query.state.as_deref())
        .await?;

    let location = format!(
        "/dashboard?user_id={}",
        urlencoding::encode(&outcome.user_id)
    );
    let cookie = session_cookie(
        &outcome.session_token,
        state.session_max_age,
        state.secure_cookies,
    );

    let mut headers = HeaderMap::new();
    headers.insert(header::LOCATION, HeaderValue::from_str(&location)?);
    headers.insert(header::SET_COOKIE, HeaderValue::from_str(&cookie)?);
    Ok((StatusCode::SEE_OTHER, headers))
}
