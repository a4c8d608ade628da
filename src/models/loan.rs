//! Loan model, lifecycle rules and ledger inputs

use std::borrow::Cow;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

use super::book::Availability;
use super::fine::FinePolicy;
use super::user::UserIdentifier;
use crate::error::{AppError, AppResult};

/// Loan lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "loan_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Approved,
    Returned,
    Rejected,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Approved => "approved",
            LoanStatus::Returned => "returned",
            LoanStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoanStatus::Returned | LoanStatus::Rejected)
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(LoanStatus::Pending),
            "approved" => Ok(LoanStatus::Approved),
            "returned" => Ok(LoanStatus::Returned),
            "rejected" => Ok(LoanStatus::Rejected),
            _ => Err(format!("Invalid loan status: {}", s)),
        }
    }
}

/// Loan model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub loan_date: NaiveDate,
    pub due_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    /// Persisted fine in currency minor units
    pub fine: i64,
    pub status: LoanStatus,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Pending loan ready to insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoan {
    pub user_id: i32,
    pub book_id: i32,
    pub loan_date: NaiveDate,
    pub due_date: NaiveDate,
}

/// Admin action applied to an existing loan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoanAction {
    Approve,
    Reject { reason: String },
    Return {
        return_date: NaiveDate,
        /// Externally supplied fine; computed from the policy when absent
        fine: Option<i64>,
    },
}

impl LoanAction {
    pub fn name(&self) -> &'static str {
        match self {
            LoanAction::Approve => "approve",
            LoanAction::Reject { .. } => "reject",
            LoanAction::Return { .. } => "return",
        }
    }
}

/// Changes to write for one transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanUpdate {
    pub status: LoanStatus,
    pub return_date: Option<NaiveDate>,
    pub fine: i64,
    pub rejection_reason: Option<String>,
    /// Change to apply to the book's availability counter
    pub availability_delta: i32,
}

impl Loan {
    /// Decide the outcome of `action` against this loan and its book counter.
    ///
    /// Pure: nothing is written. The caller persists the update and the
    /// counter change together or not at all.
    pub fn plan(
        &self,
        action: &LoanAction,
        availability: Availability,
        policy: &FinePolicy,
    ) -> AppResult<LoanUpdate> {
        let update = match (self.status, action) {
            (_, LoanAction::Reject { reason }) if reason.trim().is_empty() => {
                return Err(AppError::Validation(
                    "reason: a rejection reason is required".to_string(),
                ));
            }
            (LoanStatus::Pending, LoanAction::Approve) => {
                if !availability.has_copy() {
                    return Err(AppError::Unavailable(format!(
                        "Book {} has no copies available",
                        self.book_id
                    )));
                }
                LoanUpdate {
                    status: LoanStatus::Approved,
                    return_date: None,
                    fine: 0,
                    rejection_reason: None,
                    availability_delta: -1,
                }
            }
            (LoanStatus::Pending, LoanAction::Reject { reason }) => LoanUpdate {
                status: LoanStatus::Rejected,
                return_date: None,
                fine: 0,
                rejection_reason: Some(reason.trim().to_string()),
                availability_delta: 0,
            },
            // Cancels an active loan: the copy goes back on the shelf
            (LoanStatus::Approved, LoanAction::Reject { reason }) => LoanUpdate {
                status: LoanStatus::Rejected,
                return_date: None,
                fine: 0,
                rejection_reason: Some(reason.trim().to_string()),
                availability_delta: 1,
            },
            (LoanStatus::Approved, LoanAction::Return { return_date, fine }) => {
                if *return_date < self.loan_date {
                    return Err(AppError::Validation(format!(
                        "return_date: {} is before the loan date {}",
                        return_date, self.loan_date
                    )));
                }
                let days_late = FinePolicy::days_late(self.due_date, *return_date);
                let fine = match fine {
                    Some(f) if *f < 0 => {
                        return Err(AppError::Validation(
                            "fine: must not be negative".to_string(),
                        ));
                    }
                    Some(f) if *f > 0 && days_late == 0 => {
                        return Err(AppError::Validation(
                            "fine: only late returns can be fined".to_string(),
                        ));
                    }
                    Some(f) => *f,
                    None => policy.fine_for(self.due_date, *return_date),
                };
                LoanUpdate {
                    status: LoanStatus::Returned,
                    return_date: Some(*return_date),
                    fine,
                    rejection_reason: None,
                    availability_delta: 1,
                }
            }
            (status, action) => {
                return Err(AppError::InvalidTransition(format!(
                    "Cannot {} a loan that is {}",
                    action.name(),
                    status
                )));
            }
        };

        // Surface counter violations before anything is written
        availability.adjust(update.availability_delta)?;

        Ok(update)
    }

    /// Whether an approved loan is past its due date on `today`
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status == LoanStatus::Approved && self.return_date.is_none() && today > self.due_date
    }
}

/// Loan joined with display fields, as read from the database
#[derive(Debug, Clone, FromRow)]
pub struct LoanDetailsRow {
    #[sqlx(flatten)]
    pub loan: Loan,
    pub title: String,
    pub author: String,
    pub cover_image: Option<String>,
    pub user_name: String,
    pub user_email: String,
}

impl LoanDetailsRow {
    pub fn into_details(self, policy: &FinePolicy, today: NaiveDate) -> LoanDetails {
        let is_overdue = self.loan.is_overdue(today);
        let projected_fine = policy.projected_fine(&self.loan, today);
        LoanDetails {
            loan: self.loan,
            title: self.title,
            author: self.author,
            cover_image: self.cover_image,
            user_name: self.user_name,
            user_email: self.user_email,
            is_overdue,
            projected_fine,
        }
    }
}

/// Loan with book and borrower details for display
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanDetails {
    #[serde(flatten)]
    pub loan: Loan,
    pub title: String,
    pub author: String,
    pub cover_image: Option<String>,
    pub user_name: String,
    pub user_email: String,
    pub is_overdue: bool,
    /// Fine owed if the loan were returned today; never persisted
    pub projected_fine: i64,
}

/// Loan listing filter
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct LoanQuery {
    /// User id or email
    pub user: Option<String>,
    pub status: Option<LoanStatus>,
}

/// Resolved listing filter handed to the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoanFilter {
    pub user_id: Option<i32>,
    pub status: Option<LoanStatus>,
}

fn validate_loan_dates(request: &RequestLoan) -> Result<(), ValidationError> {
    if let (Some(loan_date), Some(due_date)) = (request.loan_date, request.due_date) {
        if due_date < loan_date {
            let mut error = ValidationError::new("date_order");
            error.message = Some(Cow::from("due_date must not be before loan_date"));
            return Err(error);
        }
    }
    Ok(())
}

fn non_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some(Cow::from("a rejection reason is required"));
        return Err(error);
    }
    Ok(())
}

/// Borrow request handed to the ledger
#[derive(Debug, Clone, Validate)]
#[validate(schema(function = "validate_loan_dates"))]
pub struct RequestLoan {
    pub user: UserIdentifier,
    #[validate(range(min = 1, message = "must be a positive id"))]
    pub book_id: i32,
    pub loan_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
}

/// Reject request body
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RejectLoan {
    #[validate(custom(function = "non_blank"))]
    pub reason: String,
}

/// Return request body
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ReturnLoan {
    /// Defaults to today
    pub return_date: Option<NaiveDate>,
    /// Overrides the computed fine
    #[validate(range(min = 0, message = "must not be negative"))]
    pub fine: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn loan(status: LoanStatus) -> Loan {
        Loan {
            id: 7,
            user_id: 3,
            book_id: 11,
            loan_date: date(2024, 3, 1),
            due_date: date(2024, 3, 15),
            return_date: None,
            fine: 0,
            status,
            rejection_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn stock(available: i32, quantity: i32) -> Availability {
        Availability { available, quantity }
    }

    fn returning(on: NaiveDate, fine: Option<i64>) -> LoanAction {
        LoanAction::Return { return_date: on, fine }
    }

    fn reject(reason: &str) -> LoanAction {
        LoanAction::Reject { reason: reason.to_string() }
    }

    #[test]
    fn test_approve_takes_a_copy() {
        let update = loan(LoanStatus::Pending)
            .plan(&LoanAction::Approve, stock(2, 2), &FinePolicy::default())
            .unwrap();
        assert_eq!(update.status, LoanStatus::Approved);
        assert_eq!(update.availability_delta, -1);
    }

    #[test]
    fn test_approve_without_copies_is_unavailable() {
        let result = loan(LoanStatus::Pending).plan(&LoanAction::Approve, stock(0, 2), &FinePolicy::default());
        assert!(matches!(result, Err(AppError::Unavailable(_))));
    }

    #[test]
    fn test_reject_pending_keeps_counter() {
        let update = loan(LoanStatus::Pending)
            .plan(&reject("  damaged copy "), stock(1, 1), &FinePolicy::default())
            .unwrap();
        assert_eq!(update.status, LoanStatus::Rejected);
        assert_eq!(update.rejection_reason.as_deref(), Some("damaged copy"));
        assert_eq!(update.availability_delta, 0);
    }

    #[test]
    fn test_reject_approved_restores_copy() {
        let update = loan(LoanStatus::Approved)
            .plan(&reject("cancelled"), stock(0, 1), &FinePolicy::default())
            .unwrap();
        assert_eq!(update.status, LoanStatus::Rejected);
        assert_eq!(update.availability_delta, 1);
    }

    #[test]
    fn test_reject_requires_reason() {
        for reason in ["", "   "] {
            let result = loan(LoanStatus::Pending).plan(&reject(reason), stock(1, 1), &FinePolicy::default());
            assert!(matches!(result, Err(AppError::Validation(_))));
        }
    }

    #[test]
    fn test_return_on_due_date_has_no_fine() {
        let update = loan(LoanStatus::Approved)
            .plan(&returning(date(2024, 3, 15), None), stock(0, 1), &FinePolicy::default())
            .unwrap();
        assert_eq!(update.status, LoanStatus::Returned);
        assert_eq!(update.return_date, Some(date(2024, 3, 15)));
        assert_eq!(update.fine, 0);
        assert_eq!(update.availability_delta, 1);
    }

    #[test]
    fn test_return_three_days_late() {
        let update = loan(LoanStatus::Approved)
            .plan(&returning(date(2024, 3, 18), None), stock(0, 1), &FinePolicy::new(5000))
            .unwrap();
        assert_eq!(update.fine, 15000);
    }

    #[test]
    fn test_return_with_supplied_fine() {
        let update = loan(LoanStatus::Approved)
            .plan(&returning(date(2024, 3, 18), Some(2000)), stock(0, 1), &FinePolicy::default())
            .unwrap();
        assert_eq!(update.fine, 2000);

        // Waiving a late fine is allowed
        let update = loan(LoanStatus::Approved)
            .plan(&returning(date(2024, 3, 18), Some(0)), stock(0, 1), &FinePolicy::default())
            .unwrap();
        assert_eq!(update.fine, 0);
    }

    #[test]
    fn test_return_rejects_fine_on_time() {
        let result = loan(LoanStatus::Approved).plan(
            &returning(date(2024, 3, 10), Some(5000)),
            stock(0, 1),
            &FinePolicy::default(),
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_return_rejects_negative_fine() {
        let result = loan(LoanStatus::Approved).plan(
            &returning(date(2024, 3, 20), Some(-1)),
            stock(0, 1),
            &FinePolicy::default(),
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_return_before_loan_date() {
        let result = loan(LoanStatus::Approved).plan(
            &returning(date(2024, 2, 1), None),
            stock(0, 1),
            &FinePolicy::default(),
        );
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_return_requires_approved_loan() {
        for status in [LoanStatus::Pending, LoanStatus::Rejected, LoanStatus::Returned] {
            let result = loan(status).plan(&returning(date(2024, 3, 10), None), stock(1, 1), &FinePolicy::default());
            assert!(
                matches!(result, Err(AppError::InvalidTransition(_))),
                "return from {} should be refused",
                status
            );
        }
    }

    #[test]
    fn test_terminal_states_refuse_everything() {
        let actions = [LoanAction::Approve, reject("late"), returning(date(2024, 3, 10), None)];
        for status in [LoanStatus::Returned, LoanStatus::Rejected] {
            assert!(status.is_terminal());
            for action in &actions {
                let result = loan(status).plan(action, stock(1, 1), &FinePolicy::default());
                assert!(matches!(result, Err(AppError::InvalidTransition(_))));
            }
        }
    }

    #[test]
    fn test_approve_twice_is_invalid() {
        let result = loan(LoanStatus::Approved).plan(&LoanAction::Approve, stock(1, 2), &FinePolicy::default());
        assert!(matches!(result, Err(AppError::InvalidTransition(_))));
    }

    #[test]
    fn test_return_with_counter_at_capacity_is_refused() {
        let result = loan(LoanStatus::Approved).plan(
            &returning(date(2024, 3, 10), None),
            stock(1, 1),
            &FinePolicy::default(),
        );
        assert!(matches!(result, Err(AppError::InvalidTransition(_))));
    }

    /// Drives every loan on a two-copy title through every action order and
    /// checks the counter after each committed step.
    #[test]
    fn test_counter_stays_in_bounds_across_sequences() {
        let policy = FinePolicy::default();
        let actions = [LoanAction::Approve, reject("no"), returning(date(2024, 3, 20), None)];
        let quantity = 2;

        // Three loans competing for two copies, each receives up to three actions
        for seed in 0..(3usize.pow(9)) {
            let mut loans: Vec<Loan> = (0..3).map(|_| loan(LoanStatus::Pending)).collect();
            let mut counter = stock(quantity, quantity);
            let mut rest = seed;

            for step in 0..9 {
                let target = step % 3;
                let action = &actions[rest % 3];
                rest /= 3;

                if let Ok(update) = loans[target].plan(action, counter, &policy) {
                    counter = counter.adjust(update.availability_delta).unwrap();
                    loans[target].status = update.status;
                    loans[target].return_date = update.return_date;
                    loans[target].fine = update.fine;
                }

                assert!(counter.available >= 0 && counter.available <= quantity);
                let out = loans.iter().filter(|l| l.status == LoanStatus::Approved).count() as i32;
                assert_eq!(counter.available, quantity - out);
                assert!(loans.iter().all(|l| l.fine >= 0));
            }
        }
    }

    #[test]
    fn test_request_return_cycle_nets_to_zero() {
        let policy = FinePolicy::default();
        let mut subject = loan(LoanStatus::Pending);
        let original = stock(3, 3);

        let approve = subject.plan(&LoanAction::Approve, original, &policy).unwrap();
        let after_approve = original.adjust(approve.availability_delta).unwrap();
        subject.status = approve.status;

        let ret = subject.plan(&returning(date(2024, 3, 15), None), after_approve, &policy).unwrap();
        assert_eq!(after_approve.adjust(ret.availability_delta).unwrap(), original);
    }

    #[test]
    fn test_is_overdue() {
        let mut subject = loan(LoanStatus::Approved);
        assert!(!subject.is_overdue(date(2024, 3, 15)));
        assert!(subject.is_overdue(date(2024, 3, 16)));

        subject.status = LoanStatus::Pending;
        assert!(!subject.is_overdue(date(2024, 3, 16)));
    }

    #[test]
    fn test_request_validation() {
        let valid = RequestLoan {
            user: UserIdentifier::Id(1),
            book_id: 4,
            loan_date: Some(date(2024, 3, 1)),
            due_date: Some(date(2024, 3, 1)),
        };
        assert!(valid.validate().is_ok());

        let backwards = RequestLoan {
            due_date: Some(date(2024, 2, 28)),
            ..valid.clone()
        };
        assert!(backwards.validate().is_err());

        let no_book = RequestLoan { book_id: 0, ..valid };
        assert!(no_book.validate().is_err());
    }

    #[test]
    fn test_reject_body_validation() {
        assert!(RejectLoan { reason: "lost".into() }.validate().is_ok());
        assert!(RejectLoan { reason: " \t".into() }.validate().is_err());
    }

    #[test]
    fn test_return_body_is_strict() {
        let parsed: ReturnLoan = serde_json::from_str(r#"{"return_date":"2024-03-18","fine":0}"#).unwrap();
        assert_eq!(parsed.return_date, Some(date(2024, 3, 18)));

        // Lenient shapes are refused at the edge
        assert!(serde_json::from_str::<ReturnLoan>(r#"{"fine":"5000"}"#).is_err());
        assert!(serde_json::from_str::<ReturnLoan>(r#"{"return_date":""}"#).is_err());
        assert!(serde_json::from_str::<ReturnLoan>(r#"{"status":"returned"}"#).is_err());

        let negative = ReturnLoan { return_date: None, fine: Some(-5) };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_status_serde() {
        assert_eq!(serde_json::to_string(&LoanStatus::Approved).unwrap(), "\"approved\"");
        assert_eq!("Returned".parse::<LoanStatus>().unwrap(), LoanStatus::Returned);
        assert!("lost".parse::<LoanStatus>().is_err());
    }
}
