//! Loan management endpoints

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult},
    models::{
        loan::{Loan, LoanDetails, LoanQuery, RejectLoan, RequestLoan, ReturnLoan},
        user::{Role, UserIdentifier},
    },
};

use super::{guard, AppJson, AppPath, AppQuery, AuthenticatedUser};

/// Create loan request
#[derive(Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateLoanRequest {
    /// Borrower id or email (admins only; defaults to the caller)
    pub user: Option<String>,
    /// Book ID
    pub book_id: i32,
    /// Defaults to today
    pub loan_date: Option<NaiveDate>,
    /// Defaults to the configured loan duration after the loan date
    pub due_date: Option<NaiveDate>,
}

/// List loans
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanQuery),
    responses(
        (status = 200, description = "Matching loans, newest first", body = Vec<LoanDetails>),
        (status = 404, description = "User not found")
    )
)]
pub async fn list_loans(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    AppQuery(mut query): AppQuery<LoanQuery>,
) -> AppResult<Json<Vec<LoanDetails>>> {
    // Readers only ever see their own loans
    if !claims.is_admin() {
        query.user = Some(claims.user_id.to_string());
    }

    let loans = state.services.loans.list_loans(&query).await?;
    Ok(Json(loans))
}

/// Get a loan
#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan details", body = LoanDetails),
        (status = 400, description = "Malformed loan ID"),
        (status = 404, description = "Loan not found, or not borrowed by the caller")
    )
)]
pub async fn get_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    AppPath(loan_id): AppPath<i32>,
) -> AppResult<Json<LoanDetails>> {
    let loan = state.services.loans.get_loan(loan_id).await?;
    guard::require_visible(&claims, loan.loan.user_id, &format!("Loan with id {}", loan_id))?;

    Ok(Json(loan))
}

/// Request a loan
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = CreateLoanRequest,
    responses(
        (status = 201, description = "Loan requested", body = Loan),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "User or book not found"),
        (status = 409, description = "Book unavailable")
    )
)]
pub async fn create_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    AppJson(request): AppJson<CreateLoanRequest>,
) -> AppResult<(StatusCode, Json<Loan>)> {
    let user = match request.user.as_deref() {
        Some(user) => {
            let identifier: UserIdentifier = user.parse()?;
            let is_self = match &identifier {
                UserIdentifier::Id(id) => *id == claims.user_id,
                UserIdentifier::Email(email) => email.eq_ignore_ascii_case(&claims.sub),
            };
            if !is_self {
                guard::require_role(&claims, Role::Admin).map_err(|_| {
                    AppError::Authorization("Only admins can borrow on behalf of another user".to_string())
                })?;
            }
            identifier
        }
        None => claims.identifier(),
    };

    let loan = state
        .services
        .loans
        .request_loan(RequestLoan {
            user,
            book_id: request.book_id,
            loan_date: request.loan_date,
            due_date: request.due_date,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(loan)))
}

/// Approve a pending loan
#[utoipa::path(
    post,
    path = "/loans/{id}/approve",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan approved", body = Loan),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Not pending, or no copies left")
    )
)]
pub async fn approve_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    AppPath(loan_id): AppPath<i32>,
) -> AppResult<Json<Loan>> {
    guard::require_role(&claims, Role::Admin)?;

    let loan = state.services.loans.approve(loan_id).await?;
    Ok(Json(loan))
}

/// Reject a pending loan or cancel an approved one
#[utoipa::path(
    post,
    path = "/loans/{id}/reject",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    request_body = RejectLoan,
    responses(
        (status = 200, description = "Loan rejected", body = Loan),
        (status = 400, description = "Missing reason"),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Loan already closed")
    )
)]
pub async fn reject_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    AppPath(loan_id): AppPath<i32>,
    AppJson(request): AppJson<RejectLoan>,
) -> AppResult<Json<Loan>> {
    guard::require_role(&claims, Role::Admin)?;

    let loan = state.services.loans.reject(loan_id, request).await?;
    Ok(Json(loan))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    request_body = ReturnLoan,
    responses(
        (status = 200, description = "Book returned", body = Loan),
        (status = 400, description = "Invalid return date or fine"),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Loan is not approved")
    )
)]
pub async fn return_loan(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    AppPath(loan_id): AppPath<i32>,
    AppJson(request): AppJson<ReturnLoan>,
) -> AppResult<Json<Loan>> {
    guard::require_role(&claims, Role::Admin)?;

    let loan = state.services.loans.return_loan(loan_id, request).await?;
    Ok(Json(loan))
}
