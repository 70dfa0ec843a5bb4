//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{health, loans, reservations, sweeps};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Elidune Circulation API",
        version = "1.1.0",
        description = "Loans, reservations and circulation sweeps",
        license(name = "GPL-2.0", url = "https://www.gnu.org/licenses/gpl-2.0.html"),
        contact(name = "Elidune Team", email = "contact@elidune.org")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Loans
        loans::get_user_loans,
        loans::create_loan,
        loans::return_loan,
        loans::renew_loan,
        loans::get_loan_counts,
        // Reservations
        reservations::create_reservation,
        reservations::cancel_reservation,
        reservations::convert_reservation,
        reservations::get_user_reservations,
        reservations::get_book_queue,
        // Sweeps
        sweeps::run_expiration,
        sweeps::run_overdue,
        sweeps::get_status,
    ),
    components(
        schemas(
            // Loans
            loans::BorrowRequest,
            loans::LoanCounts,
            crate::models::loan::BorrowRecord,
            crate::models::loan::LoanStatus,
            // Reservations
            reservations::ReserveRequest,
            reservations::CancelRequest,
            crate::models::reservation::Reservation,
            crate::models::reservation::ReservationStatus,
            crate::models::reservation::ReservationPage,
            // Sweeps
            sweeps::SweepResponse,
            sweeps::SweepStatus,
            crate::services::sweep::SweepReport,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "loans", description = "Borrowing, returning and renewing"),
        (name = "reservations", description = "Reservation queue"),
        (name = "sweeps", description = "Expiration and overdue sweeps")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
