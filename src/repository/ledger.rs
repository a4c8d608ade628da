//! Storage seam for the loan ledger

use async_trait::async_trait;

use super::{books::BooksRepository, loans::LoansRepository, Repository};
use crate::{
    error::AppResult,
    models::{
        book::Availability,
        fine::FinePolicy,
        loan::{Loan, LoanAction, LoanDetailsRow, LoanFilter, LoanStatus, NewLoan},
        user::UserIdentifier,
    },
};

/// Everything the loan ledger needs from persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Check the store is reachable
    async fn ping(&self) -> AppResult<()>;

    async fn resolve_user(&self, identifier: &UserIdentifier) -> AppResult<i32>;

    async fn get_availability(&self, book_id: i32) -> AppResult<Availability>;

    async fn create_loan(&self, loan: NewLoan) -> AppResult<Loan>;

    /// Apply `action` to a loan atomically: the status change and the
    /// availability adjustment are committed together or not at all.
    async fn transition(&self, loan_id: i32, action: LoanAction, policy: FinePolicy) -> AppResult<Loan>;

    async fn get_loan(&self, loan_id: i32) -> AppResult<LoanDetailsRow>;

    async fn list_loans(&self, filter: LoanFilter) -> AppResult<Vec<LoanDetailsRow>>;
}

#[async_trait]
impl LedgerStore for Repository {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn resolve_user(&self, identifier: &UserIdentifier) -> AppResult<i32> {
        self.users.resolve_user(identifier).await
    }

    async fn get_availability(&self, book_id: i32) -> AppResult<Availability> {
        self.books.get_availability(book_id).await
    }

    async fn create_loan(&self, loan: NewLoan) -> AppResult<Loan> {
        self.loans.create(&loan).await
    }

    async fn transition(&self, loan_id: i32, action: LoanAction, policy: FinePolicy) -> AppResult<Loan> {
        // Dropping the transaction on any early return rolls it back
        let mut tx = self.pool.begin().await?;

        let loan = LoansRepository::lock_for_update(&mut tx, loan_id).await?;
        let availability = BooksRepository::lock_availability(&mut tx, loan.book_id).await?;

        let update = loan.plan(&action, availability, &policy)?;

        let updated = LoansRepository::apply_update(&mut tx, loan.id, &update).await?;
        if update.availability_delta != 0 {
            BooksRepository::adjust_availability(&mut tx, loan.book_id, update.availability_delta).await?;
        }

        tx.commit().await?;

        if loan.status == LoanStatus::Approved && updated.status == LoanStatus::Rejected {
            tracing::warn!(
                "Approved loan {} cancelled, copy of book {} restored: {}",
                updated.id,
                updated.book_id,
                updated.rejection_reason.as_deref().unwrap_or_default()
            );
        } else {
            tracing::info!(
                "Loan {} {} -> {} (book {}, fine {})",
                updated.id,
                loan.status,
                updated.status,
                updated.book_id,
                updated.fine
            );
        }

        Ok(updated)
    }

    async fn get_loan(&self, loan_id: i32) -> AppResult<LoanDetailsRow> {
        self.loans.get_details(loan_id).await
    }

    async fn list_loans(&self, filter: LoanFilter) -> AppResult<Vec<LoanDetailsRow>> {
        self.loans.list(filter).await
    }
}
