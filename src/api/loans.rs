//! Loan management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::loan::{BorrowRecord, LoanQuery},
    AppState,
};

use super::AuthenticatedUser;

/// Borrow request
#[derive(Deserialize, ToSchema)]
pub struct BorrowRequest {
    /// Book to borrow
    pub book_id: i32,
}

/// Loan counters
#[derive(Serialize, ToSchema)]
pub struct LoanCounts {
    pub active: i64,
    pub overdue: i64,
}

/// Get loans for a specific user
#[utoipa::path(
    get,
    path = "/users/{id}/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID"),
        LoanQuery
    ),
    responses(
        (status = 200, description = "User's loans, most recent first", body = Vec<BorrowRecord>),
        (status = 403, description = "Not allowed to read this user's loans")
    )
)]
pub async fn get_user_loans(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(user_id): Path<i32>,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<Vec<BorrowRecord>>> {
    caller.require_self_or_staff(user_id)?;

    let loans = state
        .services
        .circulation
        .list_user_loans(user_id, query.status)
        .await?;
    Ok(Json(loans))
}

/// Borrow a book for the authenticated user
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = BorrowRequest,
    responses(
        (status = 201, description = "Loan created", body = BorrowRecord),
        (status = 404, description = "User or book not found"),
        (status = 422, description = "Out of stock, borrow limit or same title twice")
    )
)]
pub async fn create_loan(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(request): Json<BorrowRequest>,
) -> AppResult<(StatusCode, Json<BorrowRecord>)> {
    let loan = state
        .services
        .circulation
        .borrow(request.book_id, caller.user_id)
        .await?;

    Ok((StatusCode::CREATED, Json(loan)))
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
    responses(
        (status = 200, description = "Book returned", body = BorrowRecord),
        (status = 403, description = "Loan belongs to another user"),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Already returned")
    )
)]
pub async fn return_loan(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(loan_id): Path<i32>,
) -> AppResult<Json<BorrowRecord>> {
    let loan = state
        .services
        .circulation
        .return_book(loan_id, caller.user_id)
        .await?;
    Ok(Json(loan))
}

/// Renew a loan
#[utoipa::path(
    post,
    path = "/loans/{id}/renew",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan renewed", body = BorrowRecord),
        (status = 403, description = "Loan belongs to another user"),
        (status = 404, description = "Loan not found"),
        (status = 409, description = "Already returned")
    )
)]
pub async fn renew_loan(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(loan_id): Path<i32>,
) -> AppResult<Json<BorrowRecord>> {
    let loan = state.services.circulation.renew(loan_id, caller.user_id).await?;
    Ok(Json(loan))
}

/// Count active and overdue loans
#[utoipa::path(
    get,
    path = "/loans/counts",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Loan counters", body = LoanCounts),
        (status = 403, description = "Librarian privileges required")
    )
)]
pub async fn get_loan_counts(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
) -> AppResult<Json<LoanCounts>> {
    caller.require_staff()?;

    Ok(Json(LoanCounts {
        active: state.services.circulation.count_active().await?,
        overdue: state.services.circulation.count_overdue().await?,
    }))
}
