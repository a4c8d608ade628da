//! Books repository: availability counter

use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::book::Availability,
};

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get the availability counter of a book
    pub async fn get_availability(&self, book_id: i32) -> AppResult<Availability> {
        sqlx::query_as::<_, Availability>("SELECT available, quantity FROM books WHERE id = $1")
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))
    }

    /// Read and lock the counter for the rest of the transaction
    pub async fn lock_availability(conn: &mut PgConnection, book_id: i32) -> AppResult<Availability> {
        sqlx::query_as::<_, Availability>(
            "SELECT available, quantity FROM books WHERE id = $1 FOR UPDATE",
        )
        .bind(book_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))
    }

    /// Shift the counter by `delta`.
    ///
    /// Fails without writing when the result would leave `0..=quantity`.
    pub async fn adjust_availability(
        conn: &mut PgConnection,
        book_id: i32,
        delta: i32,
    ) -> AppResult<Availability> {
        let current = Self::lock_availability(conn, book_id).await?;
        let next = current.adjust(delta)?;

        sqlx::query("UPDATE books SET available = $1, updated_at = NOW() WHERE id = $2")
            .bind(next.available)
            .bind(book_id)
            .execute(&mut *conn)
            .await?;

        tracing::debug!(
            "Book {} availability {} -> {} (of {})",
            book_id,
            current.available,
            next.available,
            next.quantity
        );

        Ok(next)
    }
}
