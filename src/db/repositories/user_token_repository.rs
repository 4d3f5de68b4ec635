use crate::db::DbPool;
use crate::db::connection::get_connection;
use crate::db::error::RepositoryError;
use crate::db::models::user_token::{NewUserToken, TokenUpdate, UserToken};
use crate::db::schema::user_tokens;
use chrono::Utc;
use diesel::prelude::*;

pub struct UserTokenRepository;

impl UserTokenRepository {
    /// Insert-or-replace: the whole row is overwritten on re-login
    pub fn upsert(pool: &DbPool, token: &NewUserToken) -> Result<(), RepositoryError> {
        let mut conn = get_connection(pool)?;

        diesel::replace_into(user_tokens::table)
            .values(token)
            .execute(&mut conn)?;

        Ok(())
    }

    pub fn find(pool: &DbPool, user_id: &str) -> Result<Option<UserToken>, RepositoryError> {
        let mut conn = get_connection(pool)?;

        user_tokens::table
            .find(user_id)
            .select(UserToken::as_select())
            .first(&mut conn)
            .optional()
            .map_err(Into::into)
    }

    /// Stores refreshed credentials. When the provider did not rotate the
    /// refresh token (`refresh_token == None`) the previous one is kept.
    pub fn update_tokens(
        pool: &DbPool,
        user_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut conn = get_connection(pool)?;

        let changes = TokenUpdate {
            access_token,
            refresh_token,
            updated_at: Utc::now().naive_utc(),
        };

        let updated = diesel::update(user_tokens::table.find(user_id))
            .set(&changes)
            .execute(&mut conn)?;

        if updated == 0 {
            return Err(RepositoryError::NotFound(format!("user token {user_id}")));
        }
        Ok(())
    }
}
