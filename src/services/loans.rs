//! Loan ledger service

use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use validator::Validate;

use crate::{
    config::LoansConfig,
    error::{AppError, AppResult},
    models::{
        fine::FinePolicy,
        loan::{
            Loan, LoanAction, LoanDetails, LoanFilter, LoanQuery, NewLoan, RejectLoan, RequestLoan,
            ReturnLoan,
        },
        user::UserIdentifier,
    },
    repository::LedgerStore,
};

fn utc_today() -> NaiveDate {
    Utc::now().date_naive()
}

#[derive(Clone)]
pub struct LoansService {
    store: Arc<dyn LedgerStore>,
    policy: FinePolicy,
    default_loan_days: Days,
    today: fn() -> NaiveDate,
}

impl LoansService {
    pub fn new(store: Arc<dyn LedgerStore>, config: &LoansConfig) -> Self {
        let loan_days = config.default_loan_days.clamp(1, LoansConfig::MAX_LOAN_DAYS);
        Self {
            store,
            policy: FinePolicy::new(config.daily_fine),
            default_loan_days: Days::new(loan_days as u64),
            today: utc_today,
        }
    }

    /// Replace the clock used for default dates and projected fines
    pub fn with_clock(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn fine_policy(&self) -> FinePolicy {
        self.policy
    }

    /// Check the backing store is reachable
    pub async fn ping(&self) -> AppResult<()> {
        self.store.ping().await
    }

    /// Create a pending loan request.
    ///
    /// Availability is checked but not decremented; copies are only taken
    /// on approval.
    pub async fn request_loan(&self, request: RequestLoan) -> AppResult<Loan> {
        request.validate()?;

        let loan_date = request.loan_date.unwrap_or_else(self.today);
        let due_date = match request.due_date {
            Some(due_date) => due_date,
            None => loan_date
                .checked_add_days(self.default_loan_days)
                .ok_or_else(|| AppError::Validation("due_date: out of range".to_string()))?,
        };
        if due_date < loan_date {
            return Err(AppError::Validation(
                "due_date must not be before loan_date".to_string(),
            ));
        }

        let user_id = self.store.resolve_user(&request.user).await?;

        let availability = self.store.get_availability(request.book_id).await?;
        if !availability.has_copy() {
            return Err(AppError::Unavailable(format!(
                "Book {} has no copies available",
                request.book_id
            )));
        }

        let loan = self
            .store
            .create_loan(NewLoan {
                user_id,
                book_id: request.book_id,
                loan_date,
                due_date,
            })
            .await?;

        tracing::info!(
            "Loan {} requested by user {} for book {} (due {})",
            loan.id,
            user_id,
            loan.book_id,
            loan.due_date
        );

        Ok(loan)
    }

    /// Approve a pending loan, taking one copy of the book
    pub async fn approve(&self, loan_id: i32) -> AppResult<Loan> {
        self.store
            .transition(loan_id, LoanAction::Approve, self.policy)
            .await
    }

    /// Reject a pending loan, or cancel an approved one
    pub async fn reject(&self, loan_id: i32, request: RejectLoan) -> AppResult<Loan> {
        request.validate()?;

        let action = LoanAction::Reject {
            reason: request.reason.trim().to_string(),
        };
        self.store.transition(loan_id, action, self.policy).await
    }

    /// Close an approved loan and record its fine
    pub async fn return_loan(&self, loan_id: i32, request: ReturnLoan) -> AppResult<Loan> {
        request.validate()?;

        let action = LoanAction::Return {
            return_date: request.return_date.unwrap_or_else(self.today),
            fine: request.fine,
        };
        self.store.transition(loan_id, action, self.policy).await
    }

    /// Get one loan with display fields
    pub async fn get_loan(&self, loan_id: i32) -> AppResult<LoanDetails> {
        let row = self.store.get_loan(loan_id).await?;
        Ok(row.into_details(&self.policy, (self.today)()))
    }

    /// List loans matching the filter, newest first
    pub async fn list_loans(&self, query: &LoanQuery) -> AppResult<Vec<LoanDetails>> {
        let user_id = match query.user.as_deref() {
            Some(user) => {
                let identifier: UserIdentifier = user.parse()?;
                Some(self.store.resolve_user(&identifier).await?)
            }
            None => None,
        };

        let filter = LoanFilter {
            user_id,
            status: query.status,
        };

        let today = (self.today)();
        let rows = self.store.list_loans(filter).await?;
        Ok(rows
            .into_iter()
            .map(|row| row.into_details(&self.policy, today))
            .collect())
    }
}
