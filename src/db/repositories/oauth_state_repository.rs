use crate::db::DbPool;
use crate::db::connection::get_connection;
use crate::db::error::RepositoryError;
use crate::db::models::oauth_state::{NewOAuthState, OAuthState};
use crate::db::schema::oauth_states;
use chrono::NaiveDateTime;
use diesel::prelude::*;

pub struct OAuthStateRepository;

impl OAuthStateRepository {
    pub fn create(pool: &DbPool, new_state: &NewOAuthState) -> Result<(), RepositoryError> {
        let mut conn = get_connection(pool)?;

        diesel::insert_into(oauth_states::table)
            .values(new_state)
            .execute(&mut conn)?;

        Ok(())
    }

    pub fn find(pool: &DbPool, state: &str) -> Result<Option<OAuthState>, RepositoryError> {
        let mut conn = get_connection(pool)?;

        oauth_states::table
            .find(state)
            .select(OAuthState::as_select())
            .first(&mut conn)
            .optional()
            .map_err(Into::into)
    }

    /// Reads and deletes `state` in one immediate transaction.
    ///
    /// Returns the row only to the caller that actually removed it, so a
    /// state can be consumed at most once even under concurrent callbacks.
    pub fn take(pool: &DbPool, state: &str) -> Result<Option<OAuthState>, RepositoryError> {
        let mut conn = get_connection(pool)?;

        conn.immediate_transaction::<_, diesel::result::Error, _>(|conn| {
            let row = oauth_states::table
                .find(state)
                .select(OAuthState::as_select())
                .first(conn)
                .optional()?;

            if row.is_none() {
                return Ok(None);
            }

            let deleted = diesel::delete(oauth_states::table.find(state)).execute(conn)?;
            Ok(row.filter(|_| deleted == 1))
        })
        .map_err(Into::into)
    }

    /// Removes every pending authorization that expired at or before `now`
    pub fn delete_expired(pool: &DbPool, now: NaiveDateTime) -> Result<usize, RepositoryError> {
        let mut conn = get_connection(pool)?;

        diesel::delete(oauth_states::table.filter(oauth_states::expires_at.le(now)))
            .execute(&mut conn)
            .map_err(Into::into)
    }
}
