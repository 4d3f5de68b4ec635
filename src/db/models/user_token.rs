use crate::db::schema::user_tokens;
use chrono::NaiveDateTime;
use diesel::{AsChangeset, Insertable, Queryable, Selectable};

/// Full row written by the callback (insert-or-replace)
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = user_tokens)]
pub struct NewUserToken {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub username: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = user_tokens)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct UserToken {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub username: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl UserToken {
    pub fn has_access_token(&self) -> bool {
        !self.access_token.is_empty()
    }
}

/// Changes applied after a refresh grant.
///
/// A `None` refresh token leaves the stored column untouched.
#[derive(AsChangeset, Debug, Clone)]
#[diesel(table_name = user_tokens)]
pub struct TokenUpdate<'a> {
    pub access_token: &'a str,
    pub refresh_token: Option<&'a str>,
    pub updated_at: NaiveDateTime,
}
