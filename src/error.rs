// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use x_bookmarks_api::ErrorResponse;

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppError {
    // === Request errors ===
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // === OAuth flow ===
    #[error("Invalid or expired OAuth state")]
    InvalidState,
    #[error("Token exchange failed with status {status}")]
    TokenExchangeFailed { status: u16, details: String },
    #[error("Identity fetch failed: {0}")]
    IdentityFetchFailed(String),

    // === Authentication ===
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("Session expired")]
    SessionExpired,

    // === Upstream ===
    #[error("Upstream error with status {status}")]
    UpstreamError { status: u16, details: String },

    // === Internal ===
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.to_body();
        (status, Json(body)).into_response()
    }
}

impl AppError {
    /// Status code and public body; internal details are logged here and
    /// never returned to the caller.
    pub fn to_body(&self) -> (StatusCode, ErrorResponse) {
        let (status, error_code, message, details, internal_detail) = self.get_error_info();

        if let Some(ref detail) = internal_detail {
            tracing::error!(error_code, %status, detail, "Internal server error");
        }

        (
            status,
            ErrorResponse {
                error: error_code.to_string(),
                message,
                details,
            },
        )
    }

    #[allow(clippy::type_complexity)]
    fn get_error_info(
        &self,
    ) -> (
        StatusCode,
        &'static str,
        String,
        Option<String>,
        Option<String>,
    ) {
        match self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "INVALID_REQUEST",
                msg.clone(),
                None,
                None,
            ),
            AppError::InvalidInput(msg) => (
                StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
                msg.clone(),
                None,
                None,
            ),
            AppError::InvalidState => (
                StatusCode::BAD_REQUEST,
                "INVALID_STATE",
                "Unknown, expired or already used OAuth state".to_string(),
                None,
                None,
            ),
            AppError::TokenExchangeFailed { status, details } => (
                StatusCode::BAD_REQUEST,
                "TOKEN_EXCHANGE_FAILED",
                format!("X rejected the authorization code (status {status})"),
                Some(details.clone()),
                None,
            ),

            // 401 Unauthorized
            AppError::Unauthenticated(msg) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                msg.clone(),
                None,
                None,
            ),
            AppError::SessionExpired => (
                StatusCode::UNAUTHORIZED,
                "SESSION_EXPIRED",
                "Session expired, please log in again".to_string(),
                None,
                None,
            ),

            // 502 Bad Gateway
            AppError::IdentityFetchFailed(details) => (
                StatusCode::BAD_GATEWAY,
                "IDENTITY_FETCH_FAILED",
                "Could not fetch the X user profile".to_string(),
                Some(details.clone()),
                None,
            ),
            AppError::UpstreamError { status, details } => (
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_ERROR",
                format!("X API returned status {status}"),
                Some(details.clone()),
                None,
            ),

            // 500 Internal Server Error
            AppError::DatabaseError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "An error occurred with the database".to_string(),
                None,
                Some(msg.clone()),
            ),
            AppError::InternalServerError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal server error occurred".to_string(),
                None,
                Some(msg.clone()),
            ),
        }
    }

    // === Constructeurs helpers ===
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        AppError::InvalidRequest(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        AppError::InvalidInput(msg.into())
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        AppError::Unauthenticated(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        AppError::DatabaseError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::InternalServerError(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        self.get_error_info().0
    }
}

// === Conversions automatiques depuis d'autres types d'erreurs ===

impl From<crate::db::error::RepositoryError> for AppError {
    fn from(err: crate::db::error::RepositoryError) -> Self {
        AppError::database(err.to_string())
    }
}

impl From<crate::auth::jwt::JwtError> for AppError {
    fn from(err: crate::auth::jwt::JwtError) -> Self {
        match err {
            crate::auth::jwt::JwtError::GenerationFailed(e) => AppError::internal(e.to_string()),
            crate::auth::jwt::JwtError::VerificationFailed(_) => {
                AppError::unauthenticated("Invalid session token")
            }
        }
    }
}

impl From<axum::http::header::InvalidHeaderValue> for AppError {
    fn from(err: axum::http::header::InvalidHeaderValue) -> Self {
        AppError::internal(format!("Invalid header value: {err}"))
    }
}
