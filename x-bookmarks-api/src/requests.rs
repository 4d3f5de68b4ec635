use serde::{Deserialize, Serialize};

/// Query string of `GET /auth/x/callback`
///
/// Both fields are optional so that a missing parameter is reported as an
/// `INVALID_REQUEST` JSON error instead of a bare extractor rejection.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by the provider when the user denied access
    pub error: Option<String>,
}

/// Query string of `GET /api/bookmarks`
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct BookmarksQuery {
    pub user_id: Option<String>,
    pub query: Option<String>,
    pub max_results: Option<u32>,
}

/// Query string of `GET /api/bookmarks/search`
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SearchQuery {
    pub user_id: Option<String>,
    pub query: Option<String>,
    pub max_results: Option<u32>,
}

/// Query string of `/api/session` and `/api/logout`
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UserQuery {
    pub user_id: Option<String>,
}
