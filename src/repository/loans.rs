//! Loans repository for database operations

use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::loan::{Loan, LoanDetailsRow, LoanFilter, LoanStatus, LoanUpdate, NewLoan},
};

const DETAILS_SELECT: &str = r#"
    SELECT l.id, l.user_id, l.book_id, l.loan_date, l.due_date, l.return_date,
           l.fine, l.status, l.rejection_reason, l.created_at, l.updated_at,
           b.title, b.author, b.cover_image,
           u.name AS user_name, u.email AS user_email
    FROM loans l
    JOIN books b ON b.id = l.book_id
    JOIN users u ON u.id = l.user_id
"#;

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get a loan with its display fields
    pub async fn get_details(&self, id: i32) -> AppResult<LoanDetailsRow> {
        let query = format!("{} WHERE l.id = $1", DETAILS_SELECT);

        sqlx::query_as::<_, LoanDetailsRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// List loans, newest first
    pub async fn list(&self, filter: LoanFilter) -> AppResult<Vec<LoanDetailsRow>> {
        let query = format!(
            r#"
            {}
            WHERE ($1::int IS NULL OR l.user_id = $1)
              AND ($2::loan_status IS NULL OR l.status = $2)
            ORDER BY l.created_at DESC, l.id DESC
            "#,
            DETAILS_SELECT
        );

        let loans = sqlx::query_as::<_, LoanDetailsRow>(&query)
            .bind(filter.user_id)
            .bind(filter.status)
            .fetch_all(&self.pool)
            .await?;

        Ok(loans)
    }

    /// Insert a new pending loan
    pub async fn create(&self, loan: &NewLoan) -> AppResult<Loan> {
        let created = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (user_id, book_id, loan_date, due_date, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(loan.user_id)
        .bind(loan.book_id)
        .bind(loan.loan_date)
        .bind(loan.due_date)
        .bind(LoanStatus::Pending)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    /// Read a loan and lock it for the rest of the transaction
    pub async fn lock_for_update(conn: &mut PgConnection, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// Write the outcome of a transition
    pub async fn apply_update(conn: &mut PgConnection, id: i32, update: &LoanUpdate) -> AppResult<Loan> {
        let updated = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET status = $1, return_date = $2, fine = $3, rejection_reason = $4, updated_at = NOW()
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(update.status)
        .bind(update.return_date)
        .bind(update.fine)
        .bind(&update.rejection_reason)
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(updated)
    }
}
