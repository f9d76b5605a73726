//! UserService: reads and upserts rows of the `users` table.
//!
//! Upserts are a single `INSERT .. ON CONFLICT(id) DO UPDATE` statement, so
//! concurrent writers for the same `id` cannot both insert. Ordering between
//! them is whatever the database serializes them to; the last one wins.

use crate::models::user::UserLocation;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type UserResult<T> = Result<T, UserError>;

#[derive(Clone)]
pub struct UserService {
    /// Shared connection pool, safe for concurrent use by every handler.
    pub db: Arc<SqlitePool>,
}

impl UserService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Every row of the table, in whatever order the database returns them.
    ///
    /// A row that fails to decode fails the whole call; nothing partial is returned.
    pub async fn list_users(&self) -> UserResult<Vec<UserLocation>> {
        let users = sqlx::query_as::<_, UserLocation>(
            "SELECT id, latitude, longitude, type FROM users",
        )
        .fetch_all(&*self.db)
        .await?;

        debug!(count = users.len(), "listed users");
        Ok(users)
    }

    /// Insert the location, or overwrite the existing row with the same `id`.
    pub async fn upsert_user(&self, user: &UserLocation) -> UserResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, latitude, longitude, type)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                type = excluded.type
            "#,
        )
        .bind(&user.id)
        .bind(user.latitude)
        .bind(user.longitude)
        .bind(user.kind)
        .execute(&*self.db)
        .await?;

        debug!(id = %user.id, "upserted user");
        Ok(())
    }
}
