//! Users repository: identity lookups

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::user::UserIdentifier,
};

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Postgres>,
}

impl UsersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Resolve a user id from an id or an email address
    pub async fn resolve_user(&self, identifier: &UserIdentifier) -> AppResult<i32> {
        let user_id = match identifier {
            UserIdentifier::Id(id) => {
                sqlx::query_scalar::<_, i32>("SELECT id FROM users WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            UserIdentifier::Email(email) => {
                sqlx::query_scalar::<_, i32>("SELECT id FROM users WHERE LOWER(email) = LOWER($1)")
                    .bind(email)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };

        user_id.ok_or_else(|| AppError::NotFound(format!("User with {} not found", identifier)))
    }
}
