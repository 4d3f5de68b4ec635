use crate::db::DbPool;
use crate::db::repositories::user_token_repository::UserTokenRepository;
use crate::error::AppError;
use crate::provider::XApiClient;

/// Exchanges a stored refresh token for a new access token.
#[derive(Clone)]
pub struct TokenRefreshService {
    db: DbPool,
    client: XApiClient,
}

impl TokenRefreshService {
    pub fn new(db: DbPool, client: XApiClient) -> Self {
        Self { db, client }
    }

    /// Returns the new access token, or `None` when the user has no refresh
    /// token or the provider refused it. No retries; only store failures are
    /// reported as errors.
    pub async fn refresh(&self, user_id: &str) -> Result<Option<String>, AppError> {
        let Some(refresh_token) = UserTokenRepository::find(&self.db, user_id)?
            .and_then(|row| row.refresh_token)
            .filter(|t| !t.is_empty())
        else {
            tracing::info!(user_id, "No refresh token stored, skipping refresh");
            return Ok(None);
        };

        let tokens = match self.client.refresh_token(&refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(user_id, "Token refresh failed: {e}");
                return Ok(None);
            }
        };

        UserTokenRepository::update_tokens(
            &self.db,
            user_id,
            &tokens.access_token,
            tokens.refresh_token.as_deref(),
        )?;

        tracing::info!(
            user_id,
            rotated = tokens.refresh_token.is_some(),
            "Access token refreshed"
        );
        Ok(Some(tokens.access_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::db::connection::test_pool;
    use crate::db::models::user_token::NewUserToken;
    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn seed(db: &DbPool, refresh: Option<&str>) {
        let now = Utc::now().naive_utc();
        UserTokenRepository::upsert(
            db,
            &NewUserToken {
                user_id: "42".to_string(),
                access_token: "stale-access".to_string(),
                refresh_token: refresh.map(str::to_string),
                username: "jane".to_string(),
                created_at: now,
                updated_at: now,
            },
        )
        .expect("seed");
    }

    fn service(db: &DbPool, server: &MockServer) -> TokenRefreshService {
        let client = XApiClient::new(ProviderConfig::for_base_url(&server.uri())).unwrap();
        TokenRefreshService::new(db.clone(), client)
    }

    #[tokio::test]
    async fn missing_refresh_token_skips_remote_call() {
        let (db, _dir) = test_pool();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        seed(&db, None);

        let result = service(&db, &server).refresh("42").await.expect("refresh");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn successful_refresh_stores_rotated_tokens() {
        let (db, _dir) = test_pool();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2/oauth2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "fresh-access",
                "refresh_token": "new-refresh"
            })))
            .expect(1)
            .mount(&server)
            .await;
        seed(&db, Some("old-refresh"));

        let token = service(&db, &server).refresh("42").await.expect("refresh");
        assert_eq!(token.as_deref(), Some("fresh-access"));

        let row = UserTokenRepository::find(&db, "42").unwrap().unwrap();
        assert_eq!(row.access_token, "fresh-access");
        assert_eq!(row.refresh_token.as_deref(), Some("new-refresh"));
    }

    #[tokio::test]
    async fn refresh_keeps_previous_refresh_token_when_not_rotated() {
        let (db, _dir) = test_pool();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": "fresh-access" })),
            )
            .mount(&server)
            .await;
        seed(&db, Some("keep-me"));

        service(&db, &server).refresh("42").await.expect("refresh");

        let row = UserTokenRepository::find(&db, "42").unwrap().unwrap();
        assert_eq!(row.refresh_token.as_deref(), Some("keep-me"));
    }

    #[tokio::test]
    async fn rejected_refresh_returns_none_and_keeps_row() {
        let (db, _dir) = test_pool();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_request"}"#))
            .expect(1)
            .mount(&server)
            .await;
        seed(&db, Some("revoked"));

        let result = service(&db, &server).refresh("42").await.expect("refresh");
        assert!(result.is_none());

        let row = UserTokenRepository::find(&db, "42").unwrap().unwrap();
        assert_eq!(row.access_token, "stale-access");
    }
}
