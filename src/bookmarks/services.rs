// src/bookmarks/services.rs

use std::sync::Arc;
use std::time::Duration;

use x_bookmarks_api::BookmarksResponse;

use super::cache::{BookmarksCache, CacheLookup};
use crate::auth::refresh::TokenRefreshService;
use crate::db::DbPool;
use crate::db::repositories::user_token_repository::UserTokenRepository;
use crate::error::AppError;
use crate::provider::{ProviderError, XApiClient};

/// Upper bound accepted by the X bookmarks endpoint
pub const MAX_RESULTS_LIMIT: u32 = 100;
pub const DEFAULT_MAX_RESULTS: u32 = 100;
pub const DEFAULT_SEARCH_RESULTS: u32 = 10;

/// Bounded exponential backoff for transient upstream failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, initial try included
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// `base * 2^(retry_number - 1)`
    pub fn backoff_delay(&self, retry_number: u32) -> Duration {
        let shift = retry_number.saturating_sub(1).min(8);
        self.base_backoff.saturating_mul(1u32 << shift)
    }
}

#[derive(Debug)]
enum FetchOutcome {
    Success(BookmarksResponse),
    Unauthorized,
    RateLimited,
    Failed(String),
}

pub struct BookmarkService {
    db: DbPool,
    client: XApiClient,
    refresher: TokenRefreshService,
    cache: Arc<BookmarksCache>,
    retry: RetryPolicy,
}

impl BookmarkService {
    pub fn new(
        db: DbPool,
        client: XApiClient,
        refresher: TokenRefreshService,
        cache: Arc<BookmarksCache>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            db,
            client,
            refresher,
            cache,
            retry,
        }
    }

    /// Cached, refresh-aware, retrying bookmark fetch.
    ///
    /// Transient upstream problems (timeouts, 5xx, 429) never surface as
    /// errors: the caller gets an empty or cached `data` array with a
    /// message. Only bad input, missing credentials, a failed refresh and
    /// store failures are errors.
    pub async fn get_bookmarks(
        &self,
        user_id: &str,
        query: Option<&str>,
        max_results: Option<u32>,
    ) -> Result<BookmarksResponse, AppError> {
        let user_id = validate_user_id(Some(user_id))?;
        let max_results = clamp_max_results(max_results, DEFAULT_MAX_RESULTS);

        let stale = match self.cache.lookup(user_id).await {
            CacheLookup::Fresh(entry) => {
                tracing::debug!(user_id, "Serving bookmarks from cache");
                let response = BookmarksResponse {
                    cached: Some(true),
                    ..entry.bookmarks
                };
                return Ok(apply_query(response, query));
            }
            CacheLookup::Stale(entry) => Some(entry),
            CacheLookup::Miss => None,
        };

        let access_token = self.load_access_token(user_id)?;

        let mut outcome = self
            .fetch_with_retry(&access_token, user_id, max_results)
            .await;

        if matches!(outcome, FetchOutcome::Unauthorized) {
            tracing::info!(user_id, "Access token rejected by X, attempting refresh");
            let Some(new_token) = self.refresher.refresh(user_id).await? else {
                return Err(AppError::SessionExpired);
            };
            outcome = self.fetch_with_retry(&new_token, user_id, max_results).await;
        }

        let response = match outcome {
            FetchOutcome::Success(page) => {
                if !page.data.is_empty() {
                    self.cache.store(user_id, &page).await;
                }
                page
            }
            FetchOutcome::Unauthorized => {
                tracing::warn!(user_id, "Refreshed token rejected as well");
                return Err(AppError::SessionExpired);
            }
            FetchOutcome::RateLimited => {
                let fallback = match stale {
                    Some(entry) => Some(entry),
                    None => self.cache.peek(user_id).await,
                };
                match fallback {
                    Some(entry) => {
                        tracing::warn!(user_id, "Rate limited by X, serving cached bookmarks");
                        BookmarksResponse {
                            cached: Some(true),
                            rate_limited: Some(true),
                            message: Some(
                                "Rate limited by X; showing previously loaded bookmarks".to_string(),
                            ),
                            ..entry.bookmarks
                        }
                    }
                    None => {
                        tracing::warn!(user_id, "Rate limited by X, nothing cached");
                        BookmarksResponse {
                            rate_limited: Some(true),
                            ..BookmarksResponse::empty_with_message(
                                "Rate limited by X; please try again in a few minutes",
                            )
                        }
                    }
                }
            }
            FetchOutcome::Failed(message) => BookmarksResponse::empty_with_message(message),
        };

        Ok(apply_query(response, query))
    }

    /// Single fetch of up to 100 bookmarks filtered by `query`
    /// (case-insensitive). No refresh, retry or cache.
    pub async fn search_bookmarks(
        &self,
        user_id: &str,
        query: Option<&str>,
        max_results: Option<u32>,
    ) -> Result<BookmarksResponse, AppError> {
        let user_id = validate_user_id(Some(user_id))?;
        let query = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| AppError::invalid_request("Missing query parameter"))?;
        let limit = clamp_max_results(max_results, DEFAULT_SEARCH_RESULTS);

        let access_token = self.load_access_token(user_id)?;

        let page = self
            .client
            .bookmarks(&access_token, user_id, MAX_RESULTS_LIMIT)
            .await
            .map_err(|e| {
                tracing::warn!(user_id, "Bookmark search fetch failed: {e}");
                AppError::UpstreamError {
                    status: e.status().unwrap_or(502),
                    details: e.details(),
                }
            })?;

        Ok(page.filtered(query, limit as usize))
    }

    fn load_access_token(&self, user_id: &str) -> Result<String, AppError> {
        UserTokenRepository::find(&self.db, user_id)?
            .filter(|row| row.has_access_token())
            .map(|row| row.access_token)
            .ok_or_else(|| AppError::unauthenticated("No X account linked, please log in"))
    }

    async fn fetch_with_retry(&self, access_token: &str, user_id: &str, max_results: u32) -> FetchOutcome {
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error: Option<ProviderError> = None;

        for attempt in 1..=attempts {
            match self.client.bookmarks(access_token, user_id, max_results).await {
                Ok(page) => return FetchOutcome::Success(page),
                Err(e) => match e.status() {
                    Some(401) => return FetchOutcome::Unauthorized,
                    Some(429) => return FetchOutcome::RateLimited,
                    _ if e.is_transient() => {
                        tracing::warn!(user_id, attempt, attempts, "Bookmark fetch failed: {e}");
                        last_error = Some(e);
                    }
                    _ => {
                        tracing::warn!(user_id, "Bookmark fetch failed, not retrying: {e}");
                        return FetchOutcome::Failed(format!("Could not load bookmarks: {e}"));
                    }
                },
            }

            if attempt < attempts {
                let delay = self.retry.backoff_delay(attempt);
                tracing::debug!(user_id, attempt, ?delay, "Backing off before retry");
                tokio::time::sleep(delay).await;
            }
        }

        let reason = last_error.map_or_else(|| "unknown error".to_string(), |e| e.to_string());
        FetchOutcome::Failed(format!(
            "X is not responding right now ({reason}) after {attempts} attempts; please try again later"
        ))
    }
}

/// `user_id` must be a non-empty string
pub fn validate_user_id(user_id: Option<&str>) -> Result<&str, AppError> {
    user_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::invalid_input("user_id is required"))
}

/// Default when absent, then clamped into `1..=100`
pub fn clamp_max_results(requested: Option<u32>, default: u32) -> u32 {
    requested.unwrap_or(default).clamp(1, MAX_RESULTS_LIMIT)
}

fn apply_query(response: BookmarksResponse, query: Option<&str>) -> BookmarksResponse {
    match query.map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => {
            let len = response.data.len();
            response.filtered(q, len)
        }
        None => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookmarks::cache::{BOOKMARKS_TTL_SECONDS, ManualClock};
    use crate::config::ProviderConfig;
    use crate::db::connection::test_pool;
    use crate::db::models::user_token::NewUserToken;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BOOKMARKS_PATH: &str = "/2/users/42/bookmarks";

    struct Fixture {
        service: BookmarkService,
        cache: Arc<BookmarksCache>,
        clock: Arc<ManualClock>,
        db: DbPool,
        _dir: tempfile::TempDir,
    }

    fn fixture(server: &MockServer, refresh_token: Option<&str>) -> Fixture {
        fixture_with(server, refresh_token, Duration::from_secs(10))
    }

    fn fixture_with(server: &MockServer, refresh_token: Option<&str>, timeout: Duration) -> Fixture {
        let (db, dir) = test_pool();
        let now = Utc::now().naive_utc();
        UserTokenRepository::upsert(
            &db,
            &NewUserToken {
                user_id: "42".into(),
                access_token: "access-1".into(),
                refresh_token: refresh_token.map(str::to_string),
                username: "jane".into(),
                created_at: now,
                updated_at: now,
            },
        )
        .unwrap();

        let mut config = ProviderConfig::for_base_url(&server.uri());
        config.request_timeout = timeout;
        let client = XApiClient::new(config).unwrap();

        let clock = Arc::new(ManualClock::new());
        let cache = Arc::new(BookmarksCache::with_clock(
            chrono::Duration::seconds(BOOKMARKS_TTL_SECONDS),
            clock.clone(),
        ));
        let retry = RetryPolicy {
            max_attempts: 3,
            base_backoff: Duration::from_millis(20),
        };

        let service = BookmarkService::new(
            db.clone(),
            client.clone(),
            TokenRefreshService::new(db.clone(), client),
            cache.clone(),
            retry,
        );

        Fixture {
            service,
            cache,
            clock,
            db,
            _dir: dir,
        }
    }

    fn posts(texts: &[&str]) -> serde_json::Value {
        let data: Vec<_> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| json!({ "id": (i + 1).to_string(), "text": text }))
            .collect();
        json!({ "data": data, "meta": { "result_count": texts.len() } })
    }

    #[test]
    fn backoff_doubles_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(4));
    }

    #[test]
    fn max_results_is_clamped() {
        assert_eq!(clamp_max_results(None, DEFAULT_MAX_RESULTS), 100);
        assert_eq!(clamp_max_results(Some(500), DEFAULT_MAX_RESULTS), 100);
        assert_eq!(clamp_max_results(Some(0), DEFAULT_MAX_RESULTS), 1);
        assert_eq!(clamp_max_results(Some(25), DEFAULT_MAX_RESULTS), 25);
    }

    #[test]
    fn user_id_must_not_be_blank() {
        assert!(validate_user_id(None).is_err());
        assert!(validate_user_id(Some("  ")).is_err());
        assert_eq!(validate_user_id(Some("42")).unwrap(), "42");
    }

    #[tokio::test]
    async fn blank_user_id_is_invalid_input() {
        let server = MockServer::start().await;
        let f = fixture(&server, None);
        let err = f.service.get_bookmarks("", None, None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn unknown_user_is_unauthenticated() {
        let server = MockServer::start().await;
        let f = fixture(&server, None);
        let err = f
            .service
            .get_bookmarks("someone-else", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn second_call_within_ttl_is_served_from_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(BOOKMARKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(posts(&["one", "two"])))
            .expect(1)
            .mount(&server)
            .await;
        let f = fixture(&server, None);

        let first = f.service.get_bookmarks("42", None, None).await.unwrap();
        assert_eq!(first.data.len(), 2);
        assert!(first.cached.is_none());

        f.clock.advance(chrono::Duration::seconds(120));
        let second = f.service.get_bookmarks("42", None, None).await.unwrap();
        assert_eq!(second.cached, Some(true));
        assert_eq!(second.data, first.data);
    }

    #[tokio::test]
    async fn expired_cache_triggers_new_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(BOOKMARKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(posts(&["one"])))
            .expect(2)
            .mount(&server)
            .await;
        let f = fixture(&server, None);

        f.service.get_bookmarks("42", None, None).await.unwrap();
        f.clock.advance(chrono::Duration::seconds(BOOKMARKS_TTL_SECONDS));
        let again = f.service.get_bookmarks("42", None, None).await.unwrap();
        assert!(again.cached.is_none());
    }

    #[tokio::test]
    async fn empty_result_is_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(BOOKMARKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "meta": { "result_count": 0 } })))
            .mount(&server)
            .await;
        let f = fixture(&server, None);

        let response = f.service.get_bookmarks("42", None, None).await.unwrap();
        assert!(response.data.is_empty());
        assert!(f.cache.peek("42").await.is_none());
    }

    #[tokio::test]
    async fn unauthorized_then_refresh_retries_exactly_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(BOOKMARKS_PATH))
            .and(header("authorization", "Bearer access-1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "access-2",
                "refresh_token": "refresh-2"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(BOOKMARKS_PATH))
            .and(header("authorization", "Bearer access-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(posts(&["after refresh"])))
            .expect(1)
            .mount(&server)
            .await;
        let f = fixture(&server, Some("refresh-1"));

        let response = f.service.get_bookmarks("42", None, None).await.unwrap();
        assert_eq!(response.data[0].text, "after refresh");

        let row = UserTokenRepository::find(&f.db, "42").unwrap().unwrap();
        assert_eq!(row.access_token, "access-2");
    }

    #[tokio::test]
    async fn unauthorized_without_refresh_token_is_session_expired() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(BOOKMARKS_PATH))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        let f = fixture(&server, None);

        let err = f.service.get_bookmarks("42", None, None).await.unwrap_err();
        assert!(matches!(err, AppError::SessionExpired));
    }

    #[tokio::test]
    async fn failed_refresh_does_not_loop() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(BOOKMARKS_PATH))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/2/oauth2/token"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;
        let f = fixture(&server, Some("revoked"));

        let err = f.service.get_bookmarks("42", None, None).await.unwrap_err();
        assert!(matches!(err, AppError::SessionExpired));
    }

    #[tokio::test]
    async fn rate_limit_serves_stale_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(BOOKMARKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(posts(&["cached post"])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(BOOKMARKS_PATH))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        let f = fixture(&server, None);

        f.service.get_bookmarks("42", None, None).await.unwrap();
        f.clock.advance(chrono::Duration::seconds(BOOKMARKS_TTL_SECONDS + 60));

        let response = f.service.get_bookmarks("42", None, None).await.unwrap();
        assert_eq!(response.rate_limited, Some(true));
        assert_eq!(response.cached, Some(true));
        assert_eq!(response.data[0].text, "cached post");
    }

    #[tokio::test]
    async fn rate_limit_without_cache_returns_empty_notice() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(BOOKMARKS_PATH))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;
        let f = fixture(&server, None);

        let response = f.service.get_bookmarks("42", None, None).await.unwrap();
        assert!(response.data.is_empty());
        assert_eq!(response.rate_limited, Some(true));
        assert!(response.message.is_some());
    }

    #[tokio::test]
    async fn server_errors_are_retried_then_recover() {
        let server = MockServer::start().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        Mock::given(method("GET"))
            .and(path(BOOKMARKS_PATH))
            .respond_with(move |_req: &wiremock::Request| -> ResponseTemplate {
                if calls_clone.fetch_add(1, Ordering::SeqCst) < 2 {
                    ResponseTemplate::new(503)
                } else {
                    ResponseTemplate::new(200).set_body_json(posts(&["third time lucky"]))
                }
            })
            .mount(&server)
            .await;
        let f = fixture(&server, None);

        let response = f.service.get_bookmarks("42", None, None).await.unwrap();
        assert_eq!(response.data.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn repeated_timeouts_give_up_after_three_attempts_with_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(BOOKMARKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .expect(3)
            .mount(&server)
            .await;
        let f = fixture_with(&server, None, Duration::from_millis(50));

        let started = Instant::now();
        let response = f.service.get_bookmarks("42", None, None).await.unwrap();

        assert!(response.data.is_empty());
        assert!(response.message.unwrap().contains("3 attempts"));
        // 20ms + 40ms of backoff between the three attempts
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(BOOKMARKS_PATH))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;
        let f = fixture(&server, None);

        let response = f.service.get_bookmarks("42", None, None).await.unwrap();
        assert!(response.data.is_empty());
        assert!(response.message.unwrap().contains("403"));
    }

    #[tokio::test]
    async fn query_filters_cached_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(BOOKMARKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(posts(&["Rust tips", "cats", "rusty nails"])))
            .expect(1)
            .mount(&server)
            .await;
        let f = fixture(&server, None);

        f.service.get_bookmarks("42", None, None).await.unwrap();
        let filtered = f.service.get_bookmarks("42", Some("RUST"), None).await.unwrap();
        let texts: Vec<_> = filtered.data.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["Rust tips", "rusty nails"]);
    }

    #[tokio::test]
    async fn search_filters_case_insensitively_and_truncates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(BOOKMARKS_PATH))
            .and(wiremock::matchers::query_param("max_results", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(posts(&[
                "FOO first",
                "nothing here",
                "second foo",
                "third Foo",
            ])))
            .mount(&server)
            .await;
        let f = fixture(&server, None);

        let response = f
            .service
            .search_bookmarks("42", Some("foo"), Some(2))
            .await
            .unwrap();
        let texts: Vec<_> = response.data.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["FOO first", "second foo"]);
        assert!(response.meta.is_some(), "Envelope shape is preserved");
        assert!(f.cache.peek("42").await.is_none(), "Search never touches the cache");
    }

    #[tokio::test]
    async fn search_reports_upstream_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(BOOKMARKS_PATH))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        let f = fixture(&server, Some("refresh-1"));

        let err = f
            .service
            .search_bookmarks("42", Some("foo"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UpstreamError { status: 401, .. }));
    }

    #[tokio::test]
    async fn search_requires_query() {
        let server = MockServer::start().await;
        let f = fixture(&server, None);
        let err = f.service.search_bookmarks("42", None, None).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }
}
