// src/handlers/bookmarks.rs

use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use x_bookmarks_api::{BookmarksQuery, BookmarksResponse, SearchQuery};

use crate::app::AppState;
use crate::auth::extractors::SessionClaims;
use crate::bookmarks::services::validate_user_id;
use crate::error::AppError;

/// Bookmark endpoints always answer with a `data` array, errors included
pub struct BookmarksError(AppError);

impl From<AppError> for BookmarksError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for BookmarksError {
    fn into_response(self) -> Response {
        let (status, body) = self.0.to_body();
        let mut value = serde_json::to_value(&body).unwrap_or_else(|_| serde_json::json!({}));
        if let Some(object) = value.as_object_mut() {
            object.insert("data".to_string(), serde_json::json!([]));
        }
        (status, Json(value)).into_response()
    }
}

/// GET /api/bookmarks
pub async fn get_bookmarks(
    State(state): State<AppState>,
    claims: SessionClaims,
    Query(query): Query<BookmarksQuery>,
) -> Result<Json<BookmarksResponse>, BookmarksError> {
    let user_id = validate_user_id(query.user_id.as_deref())?;
    state.authorize(user_id, &claims)?;

    let response = state
        .bookmarks
        .get_bookmarks(user_id, query.query.as_deref(), query.max_results)
        .await?;
    Ok(Json(response))
}

/// GET /api/bookmarks/search
pub async fn search_bookmarks(
    State(state): State<AppState>,
    claims: SessionClaims,
    Query(query): Query<SearchQuery>,
) -> Result<Json<BookmarksResponse>, BookmarksError> {
    let user_id = validate_user_id(query.user_id.as_deref())?;
    state.authorize(user_id, &claims)?;

    let response = state
        .bookmarks
        .search_bookmarks(user_id, query.query.as_deref(), query.max_results)
        .await?;
    Ok(Json(response))
}
