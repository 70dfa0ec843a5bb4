//! API handlers for Elidune circulation endpoints

pub mod health;
pub mod loans;
pub mod openapi;
pub mod reservations;
pub mod sweeps;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use crate::{
    error::AppError,
    models::user::{AuthContext, UserClaims},
    AppState,
};

/// Extractor for authenticated user from JWT token
pub struct AuthenticatedUser(pub AuthContext);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        // Get the Authorization header
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let Some(token) = auth_header.strip_prefix("Bearer ") else {
            return Err(AppError::Authentication("Invalid authorization header format".to_string()));
        };

        let claims = UserClaims::from_token(token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(AuthenticatedUser(claims.auth_context()))
    }
}
