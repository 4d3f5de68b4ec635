//! Typed client for the X OAuth2 and v2 REST endpoints used by the service.

use reqwest::{Client, Response, StatusCode};
use serde_json::{Map, Value};
use tracing::debug;
use x_bookmarks_api::{BookmarksResponse, Post};

use super::types::{ProviderError, TokenResponse, UserEnvelope, XUser};
use crate::config::ProviderConfig;

pub const SCOPES: &str = "tweet.read users.read bookmark.read offline.access";

const TWEET_FIELDS: &str = "created_at,author_id,public_metrics,entities";
const EXPANSIONS: &str = "author_id";
const USER_FIELDS: &str = "name,username,profile_image_url";

#[derive(Clone, Debug)]
pub struct XApiClient {
    http: Client,
    config: ProviderConfig,
}

impl XApiClient {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { http, config })
    }

    /// Authorization endpoint URL for a PKCE (S256) authorization request
    pub fn authorization_url(&self, state: &str, code_challenge: &str) -> String {
        let params = [
            ("response_type", "code"),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("scope", SCOPES),
            ("state", state),
            ("code_challenge", code_challenge),
            ("code_challenge_method", "S256"),
        ];

        let query_string = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}?{}", self.config.authorize_url, query_string)
    }

    /// `grant_type=authorization_code` exchange, Basic-authenticated
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, ProviderError> {
        debug!("Exchanging authorization code for tokens");

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
            ("client_id", self.config.client_id.as_str()),
        ];
        self.token_request(&form).await
    }

    /// `grant_type=refresh_token` exchange, Basic-authenticated
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, ProviderError> {
        debug!("Refreshing access token");

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];
        self.token_request(&form).await
    }

    /// Identity of the account owning `access_token`
    pub async fn me(&self, access_token: &str) -> Result<XUser, ProviderError> {
        let response = self
            .http
            .get(format!("{}/users/me", self.config.api_base))
            .bearer_auth(access_token)
            .send()
            .await?;

        let envelope: UserEnvelope = Self::ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(envelope.data)
    }

    /// One page of the user's bookmarks. Any 200 answer is normalized so that
    /// `data` is always an array; every other status is a `Status` error.
    pub async fn bookmarks(
        &self,
        access_token: &str,
        user_id: &str,
        max_results: u32,
    ) -> Result<BookmarksResponse, ProviderError> {
        let url = format!(
            "{}/users/{}/bookmarks",
            self.config.api_base,
            urlencoding::encode(user_id)
        );
        let max_results = max_results.to_string();

        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .query(&[
                ("max_results", max_results.as_str()),
                ("tweet.fields", TWEET_FIELDS),
                ("expansions", EXPANSIONS),
                ("user.fields", USER_FIELDS),
            ])
            .send()
            .await?;

        let body = Self::ensure_success(response).await?.text().await?;
        Ok(normalize_bookmarks(&body))
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, ProviderError> {
        let response = self
            .http
            .post(&self.config.token_url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(form)
            .send()
            .await?;

        Self::ensure_success(response)
            .await?
            .json::<TokenResponse>()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }

    async fn ensure_success(response: Response) -> Result<Response, ProviderError> {
        let status = response.status();
        if status == StatusCode::OK {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(%status, "X API call failed");
        Err(ProviderError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Missing or malformed `data` becomes an empty array; entries that are not
/// posts are dropped.
fn normalize_bookmarks(body: &str) -> BookmarksResponse {
    let mut payload = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };

    let data = match payload.remove("data") {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<Post>(item).ok())
            .collect(),
        _ => Vec::new(),
    };

    BookmarksResponse {
        data,
        includes: payload.remove("includes"),
        meta: payload.remove("meta"),
        ..BookmarksResponse::default()
    }
}
