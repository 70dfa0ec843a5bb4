//! Reservation endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{
        loan::BorrowRecord,
        reservation::{Reservation, ReservationPage, ReservationQuery},
    },
    AppState,
};

use super::AuthenticatedUser;

/// Reservation request
#[derive(Deserialize, ToSchema)]
pub struct ReserveRequest {
    /// Book to reserve
    pub book_id: i32,
}

/// Cancellation request
#[derive(Deserialize, Default, ToSchema)]
pub struct CancelRequest {
    /// Free-text reason kept with the reservation
    pub reason: Option<String>,
}

/// Reserve a book that has no copy available
#[utoipa::path(
    post,
    path = "/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    request_body = ReserveRequest,
    responses(
        (status = 201, description = "Reservation created", body = Reservation),
        (status = 404, description = "User or book not found"),
        (status = 422, description = "Book available, already reserved or overdue loans")
    )
)]
pub async fn create_reservation(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Json(request): Json<ReserveRequest>,
) -> AppResult<(StatusCode, Json<Reservation>)> {
    let reservation = state
        .services
        .reservations
        .order(request.book_id, caller.user_id)
        .await?;

    Ok((StatusCode::CREATED, Json(reservation)))
}

/// Cancel a pending or ready reservation
#[utoipa::path(
    post,
    path = "/reservations/{id}/cancel",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    request_body = CancelRequest,
    responses(
        (status = 200, description = "Reservation cancelled", body = Reservation),
        (status = 403, description = "Reservation belongs to another user"),
        (status = 404, description = "Reservation not found"),
        (status = 409, description = "Reservation already closed")
    )
)]
pub async fn cancel_reservation(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(reservation_id): Path<i32>,
    request: Option<Json<CancelRequest>>,
) -> AppResult<Json<Reservation>> {
    let Json(request) = request.unwrap_or_default();

    let reservation = state
        .services
        .reservations
        .cancel(reservation_id, caller.user_id, request.reason)
        .await?;
    Ok(Json(reservation))
}

/// Turn a ready reservation into a loan
#[utoipa::path(
    post,
    path = "/reservations/{id}/convert",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    responses(
        (status = 201, description = "Loan created", body = BorrowRecord),
        (status = 403, description = "Reservation belongs to another user"),
        (status = 404, description = "Reservation not found"),
        (status = 409, description = "Reservation is not ready"),
        (status = 422, description = "No copy available or borrow rules violated")
    )
)]
pub async fn convert_reservation(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(reservation_id): Path<i32>,
) -> AppResult<(StatusCode, Json<BorrowRecord>)> {
    let loan = state
        .services
        .reservations
        .convert_to_loan(reservation_id, caller.user_id)
        .await?;

    Ok((StatusCode::CREATED, Json(loan)))
}

/// List reservations of a user
#[utoipa::path(
    get,
    path = "/users/{id}/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID"),
        ReservationQuery
    ),
    responses(
        (status = 200, description = "Pending, then ready, then closed reservations", body = ReservationPage),
        (status = 400, description = "Invalid pagination"),
        (status = 403, description = "Not allowed to read this user's reservations")
    )
)]
pub async fn get_user_reservations(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(user_id): Path<i32>,
    Query(query): Query<ReservationQuery>,
) -> AppResult<Json<ReservationPage>> {
    caller.require_self_or_staff(user_id)?;

    let page = state
        .services
        .reservations
        .list_user_orders(user_id, &query)
        .await?;
    Ok(Json(page))
}

/// Active reservation queue of a book
#[utoipa::path(
    get,
    path = "/books/{id}/queue",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Pending reservations in FIFO order, then the ready one", body = Vec<Reservation>),
        (status = 403, description = "Librarian privileges required"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book_queue(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    Path(book_id): Path<i32>,
) -> AppResult<Json<Vec<Reservation>>> {
    caller.require_staff()?;

    let queue = state.services.reservations.list_queue(book_id).await?;
    Ok(Json(queue))
}
