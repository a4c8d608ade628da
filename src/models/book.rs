//! Book availability counter

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

/// Lendable copies of a title
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Availability {
    pub available: i32,
    pub quantity: i32,
}

impl Availability {
    pub fn has_copy(&self) -> bool {
        self.available > 0
    }

    /// Apply a counter change, keeping `0 <= available <= quantity`
    pub fn adjust(self, delta: i32) -> AppResult<Self> {
        let available = self.available + delta;
        if available < 0 {
            return Err(AppError::Unavailable("No copies left to lend".to_string()));
        }
        if available > self.quantity {
            return Err(AppError::InvalidTransition(format!(
                "Availability would exceed quantity ({}/{})",
                available, self.quantity
            )));
        }
        Ok(Self {
            available,
            quantity: self.quantity,
        })
    }
}
