use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use x_bookmarks_api::BookmarksResponse;

/// Bookmarks are served from memory for five minutes
pub const BOOKMARKS_TTL_SECONDS: i64 = 300;

/// Time source for cache expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Clone, Debug)]
pub struct CachedBookmarks {
    pub bookmarks: BookmarksResponse,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum CacheLookup {
    Fresh(CachedBookmarks),
    /// Expired entry, already removed from the cache
    Stale(CachedBookmarks),
    Miss,
}

/// Per-user bookmark cache with lazy expiry
pub struct BookmarksCache {
    entries: RwLock<HashMap<String, CachedBookmarks>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl BookmarksCache {
    pub fn new() -> Self {
        Self::with_clock(Duration::seconds(BOOKMARKS_TTL_SECONDS), Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Fresh entries are returned as is; an expired entry is evicted and
    /// handed back to the caller once.
    pub async fn lookup(&self, user_id: &str) -> CacheLookup {
        let now = self.clock.now();

        {
            let entries = self.entries.read().await;
            match entries.get(user_id) {
                None => return CacheLookup::Miss,
                Some(entry) if now - entry.fetched_at < self.ttl => {
                    return CacheLookup::Fresh(entry.clone());
                }
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        match entries.remove(user_id) {
            // Another request may have refreshed it between the two locks
            Some(entry) if now - entry.fetched_at < self.ttl => {
                let fresh = entry.clone();
                entries.insert(user_id.to_string(), entry);
                CacheLookup::Fresh(fresh)
            }
            Some(entry) => CacheLookup::Stale(entry),
            None => CacheLookup::Miss,
        }
    }

    /// Any entry regardless of age
    pub async fn peek(&self, user_id: &str) -> Option<CachedBookmarks> {
        self.entries.read().await.get(user_id).cloned()
    }

    pub async fn store(&self, user_id: &str, bookmarks: &BookmarksResponse) {
        let entry = CachedBookmarks {
            bookmarks: BookmarksResponse {
                cached: None,
                rate_limited: None,
                message: None,
                ..bookmarks.clone()
            },
            fetched_at: self.clock.now(),
        };
        self.entries
            .write()
            .await
            .insert(user_id.to_string(), entry);
    }
}

impl Default for BookmarksCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Manually advanced clock for tests
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock(std::sync::Mutex<DateTime<Utc>>);

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        Self(std::sync::Mutex::new(Utc::now()))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }
}

#[cfg(test)]
impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x_bookmarks_api::Post;

    fn page(ids: &[&str]) -> BookmarksResponse {
        BookmarksResponse {
            data: ids
                .iter()
                .map(|id| Post {
                    id: (*id).to_string(),
                    text: format!("post {id}"),
                    extra: serde_json::Map::new(),
                })
                .collect(),
            ..BookmarksResponse::default()
        }
    }

    fn cache_with_clock() -> (BookmarksCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = BookmarksCache::with_clock(Duration::seconds(BOOKMARKS_TTL_SECONDS), clock.clone());
        (cache, clock)
    }

    #[tokio::test]
    async fn miss_when_empty() {
        let (cache, _) = cache_with_clock();
        assert!(matches!(cache.lookup("42").await, CacheLookup::Miss));
    }

    #[tokio::test]
    async fn fresh_within_ttl() {
        let (cache, clock) = cache_with_clock();
        cache.store("42", &page(&["1", "2"])).await;
        clock.advance(Duration::seconds(299));

        match cache.lookup("42").await {
            CacheLookup::Fresh(entry) => assert_eq!(entry.bookmarks.data.len(), 2),
            other => panic!("expected fresh entry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stale_entry_is_evicted_once() {
        let (cache, clock) = cache_with_clock();
        cache.store("42", &page(&["1"])).await;
        clock.advance(Duration::seconds(300));

        assert!(matches!(cache.lookup("42").await, CacheLookup::Stale(_)));
        assert!(matches!(cache.lookup("42").await, CacheLookup::Miss));
        assert!(cache.peek("42").await.is_none());
    }

    #[tokio::test]
    async fn store_overwrites_and_strips_annotations() {
        let (cache, _) = cache_with_clock();
        cache.store("42", &page(&["1"])).await;

        let mut annotated = page(&["2", "3"]);
        annotated.cached = Some(true);
        annotated.message = Some("note".into());
        cache.store("42", &annotated).await;

        let entry = cache.peek("42").await.unwrap();
        assert_eq!(entry.bookmarks.data.len(), 2);
        assert!(entry.bookmarks.cached.is_none());
        assert!(entry.bookmarks.message.is_none());
    }

    #[tokio::test]
    async fn entries_are_per_user() {
        let (cache, _) = cache_with_clock();
        cache.store("a", &page(&["1"])).await;
        assert!(matches!(cache.lookup("b").await, CacheLookup::Miss));
    }
}
