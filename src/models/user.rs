//! User model, caller identity and JWT claims

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

/// Borrower as seen by the circulation core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: i32,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    /// Maximum number of simultaneous loans
    pub max_borrow: i32,
    /// Denormalized count of OUT borrow records
    pub active_loan_count: i32,
}

impl User {
    pub fn can_borrow(&self) -> bool {
        self.active_loan_count < self.max_borrow
    }

    pub fn loan_opened(&mut self) {
        self.active_loan_count += 1;
    }

    /// Floored at zero so a drifted counter never goes negative
    pub fn loan_closed(&mut self) {
        self.active_loan_count = (self.active_loan_count - 1).max(0);
    }
}

/// Role carried by the caller's token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Reader,
    Librarian,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Reader => "reader",
            Role::Librarian => "librarian",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Already-authenticated caller identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: i32,
    pub role: Role,
}

impl AuthContext {
    pub fn new(user_id: i32, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Staff may read other patrons' lists and trigger sweeps
    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Librarian | Role::Admin)
    }

    pub fn require_staff(&self) -> AppResult<()> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(AppError::Unauthorized("Librarian privileges required".to_string()))
        }
    }

    pub fn require_self_or_staff(&self, user_id: i32) -> AppResult<()> {
        if self.user_id == user_id || self.is_staff() {
            Ok(())
        } else {
            Err(AppError::Unauthorized(format!(
                "User {} cannot read records of user {}",
                self.user_id, user_id
            )))
        }
    }
}

/// JWT claims issued by the authentication service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub user_id: i32,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn auth_context(&self) -> AuthContext {
        AuthContext::new(self.user_id, self.role)
    }
}
