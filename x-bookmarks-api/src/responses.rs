use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A bookmarked post as returned by the X API.
///
/// Only `id` and `text` are interpreted; every other field the API sends
/// (`created_at`, `author_id`, `public_metrics`, ...) is kept verbatim.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Post {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Post {
    /// Case-insensitive substring match against the post text
    pub fn matches(&self, needle_lowercase: &str) -> bool {
        self.text.to_lowercase().contains(needle_lowercase)
    }
}

/// Envelope returned by `/api/bookmarks` and `/api/bookmarks/search`.
///
/// `data` is always present, even when empty.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct BookmarksResponse {
    pub data: Vec<Post>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub includes: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limited: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BookmarksResponse {
    /// Empty result annotated with a human-readable message
    pub fn empty_with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Keeps only posts matching `query` (case-insensitive), preserving order,
    /// then truncates to `limit`.
    #[must_use]
    pub fn filtered(mut self, query: &str, limit: usize) -> Self {
        let needle = query.to_lowercase();
        self.data.retain(|post| post.matches(&needle));
        self.data.truncate(limit);
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionResponse {
    pub authenticated: bool,
    pub user_id: Option<String>,
    pub username: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MessageResponse {
    pub message: String,
}
