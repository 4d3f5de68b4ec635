use crate::db::schema::oauth_states;
use chrono::NaiveDateTime;
use diesel::{Insertable, Queryable, Selectable};

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = oauth_states)]
pub struct NewOAuthState {
    pub state: String,
    pub code_verifier: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

/// Pending authorization created by the login step
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = oauth_states)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct OAuthState {
    pub state: String,
    pub code_verifier: String,
    #[allow(dead_code)]
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

impl OAuthState {
    pub fn is_expired_at(&self, now: NaiveDateTime) -> bool {
        self.expires_at <= now
    }
}
