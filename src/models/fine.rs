//! Late-return fine policy

use chrono::NaiveDate;

use super::loan::{Loan, LoanStatus};

/// Flat per-day penalty applied to late returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinePolicy {
    daily_rate: i64,
}

impl FinePolicy {
    /// Negative rates are clamped to zero so fines can never go negative.
    pub fn new(daily_rate: i64) -> Self {
        Self {
            daily_rate: daily_rate.max(0),
        }
    }

    pub fn daily_rate(&self) -> i64 {
        self.daily_rate
    }

    /// Whole days between the due date and the return date, never negative
    pub fn days_late(due_date: NaiveDate, returned_on: NaiveDate) -> i64 {
        (returned_on - due_date).num_days().max(0)
    }

    /// Fine owed for a book due on `due_date` and returned on `returned_on`
    pub fn fine_for(&self, due_date: NaiveDate, returned_on: NaiveDate) -> i64 {
        Self::days_late(due_date, returned_on).saturating_mul(self.daily_rate)
    }

    /// Display-only fine for an approved loan that is still out.
    ///
    /// Returns the persisted fine for every other loan.
    pub fn projected_fine(&self, loan: &Loan, today: NaiveDate) -> i64 {
        match (loan.status, loan.return_date) {
            (LoanStatus::Approved, None) => self.fine_for(loan.due_date, today),
            _ => loan.fine,
        }
    }
}

impl Default for FinePolicy {
    fn default() -> Self {
        Self::new(5000)
    }
}
