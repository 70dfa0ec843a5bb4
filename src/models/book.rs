//! Book model

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::error::{AppError, AppResult, Policy};

/// Catalog title with its circulating stock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub author: Option<String>,
    /// Number of copies owned by the library
    pub total: i32,
    /// Copies currently on the shelf (`0 <= available <= total`)
    pub available: i32,
    /// Cumulative number of loans
    pub times: i32,
}

impl Book {
    pub fn has_stock(&self) -> bool {
        self.available > 0
    }

    /// Take one copy off the shelf for a new loan
    pub fn check_out(&mut self) -> AppResult<()> {
        if !self.has_stock() {
            return Err(AppError::PolicyViolation(Policy::OutOfStock));
        }
        self.available -= 1;
        self.times += 1;
        Ok(())
    }

    /// Put a returned copy back on the shelf
    pub fn check_in(&mut self) -> AppResult<()> {
        if self.available >= self.total {
            return Err(AppError::Internal(format!(
                "Book {} already has all {} copies on the shelf",
                self.id, self.total
            )));
        }
        self.available += 1;
        Ok(())
    }
}
