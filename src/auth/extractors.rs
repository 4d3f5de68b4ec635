use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header, request::Parts};
use std::convert::Infallible;

use crate::auth::jwt::{Claims, JwtManager};

pub const SESSION_COOKIE: &str = "x_session";

/// Optional session extractor.
///
/// Reads the signed session from the `x_session` cookie or from
/// `Authorization: Bearer <JWT>`. A missing or invalid token yields `None`;
/// handlers decide whether that is acceptable.
#[derive(Debug, Clone, Default)]
pub struct SessionClaims(pub Option<Claims>);

impl SessionClaims {
    pub fn subject(&self) -> Option<&str> {
        self.0.as_ref().map(|c| c.sub.as_str())
    }
}

impl<S> FromRequestParts<S> for SessionClaims
where
    JwtManager: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jwt_manager = JwtManager::from_ref(state);

        let claims = session_token(parts).and_then(|token| match jwt_manager.verify_token(&token) {
            Ok(claims) => Some(claims),
            Err(e) => {
                tracing::debug!("Rejected session token: {e}");
                None
            }
        });

        Ok(SessionClaims(claims))
    }
}

fn session_token(parts: &Parts) -> Option<String> {
    const BEARER: &str = "Bearer ";

    let bearer = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER))
        .map(str::to_string);

    bearer.or_else(|| {
        parts
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|h| h.to_str().ok())
            .flat_map(|raw| raw.split(';'))
            .find_map(|kv| {
                let mut it = kv.trim().splitn(2, '=');
                match (it.next(), it.next()) {
                    (Some(SESSION_COOKIE), Some(v)) => Some(v.trim().to_string()),
                    _ => None,
                }
            })
    })
}

/// `Set-Cookie` value carrying a fresh session token
pub fn session_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!("{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age_secs}{secure}")
}

/// `Set-Cookie` value that removes the session cookie
pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", 0, secure)
}
