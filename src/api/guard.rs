//! Role guards for API handlers
//!
//! Handlers resolve the caller's identity through [`super::AuthenticatedUser`]
//! and pass it here together with the role they require.

use crate::{
    error::{AppError, AppResult},
    models::user::{Role, UserClaims},
};

/// Outcome of an authorization check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny(String),
}

impl Access {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Access::Allow)
    }

    pub fn into_result(self) -> AppResult<()> {
        match self {
            Access::Allow => Ok(()),
            Access::Deny(reason) => Err(AppError::Authorization(reason)),
        }
    }
}

/// Allow callers holding at least `required`
pub fn check_role(identity: &UserClaims, required: Role) -> Access {
    if identity.role.satisfies(required) {
        Access::Allow
    } else {
        Access::Deny(format!("{} privileges required", required))
    }
}

/// Allow admins, and users acting on their own records
pub fn check_owner(identity: &UserClaims, owner_id: i32) -> Access {
    if identity.is_admin() || identity.user_id == owner_id {
        Access::Allow
    } else {
        Access::Deny("Not the owner of this record".to_string())
    }
}

pub fn require_role(identity: &UserClaims, required: Role) -> AppResult<()> {
    check_role(identity, required).into_result()
}

/// Owner check that reports records the caller may not read as missing
pub fn require_visible(identity: &UserClaims, owner_id: i32, record: &str) -> AppResult<()> {
    match check_owner(identity, owner_id) {
        Access::Allow => Ok(()),
        Access::Deny(_) => Err(AppError::NotFound(format!("{} not found", record))),
    }
}
