// src/handlers/session.rs

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
};
use x_bookmarks_api::{MessageResponse, SessionResponse, UserQuery};

use crate::app::AppState;
use crate::auth::extractors::{SessionClaims, clear_session_cookie};
use crate::bookmarks::services::validate_user_id;
use crate::error::AppError;

/// GET /api/session
/// 200 with the username when a usable token is stored, 401 otherwise
pub async fn session(
    State(state): State<AppState>,
    claims: SessionClaims,
    Query(query): Query<UserQuery>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let user_id = validate_user_id(query.user_id.as_deref())?;

    let session = match state.authorize(user_id, &claims) {
        Ok(()) => state.auth.get_session(user_id)?,
        Err(_) => SessionResponse {
            authenticated: false,
            user_id: Some(user_id.to_string()),
            username: None,
        },
    };
    let status = if session.authenticated {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    };
    Ok((status, Json(session)))
}

/// GET|POST /api/logout
/// Drops the browser session. Stored X tokens are kept.
pub async fn logout(
    State(state): State<AppState>,
    claims: SessionClaims,
) -> Result<(StatusCode, HeaderMap, Json<MessageResponse>), AppError> {
    if let Some(user_id) = claims.subject() {
        tracing::info!(user_id, "User logged out");
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&clear_session_cookie(state.secure_cookies))?,
    );

    Ok((
        StatusCode::OK,
        headers,
        Json(MessageResponse {
            message: "Logged out successfully".to_string(),
        }),
    ))
}
