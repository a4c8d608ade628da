//! Data models for Pustaka

pub mod book;
pub mod fine;
pub mod loan;
pub mod user;

// Re-export commonly used types
pub use book::Availability;
pub use fine::FinePolicy;
pub use loan::{Loan, LoanAction, LoanDetails, LoanStatus};
pub use user::{Role, UserClaims, UserIdentifier};
