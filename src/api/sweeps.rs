//! Manual triggers for the periodic sweeps

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    services::sweep::{SweepReport, SweepRun, Sweeper},
    AppState,
};

use super::AuthenticatedUser;

/// Outcome of a triggered sweep
#[derive(Serialize, ToSchema)]
pub struct SweepResponse {
    pub sweep: String,
    /// `completed` or `already_running`
    pub status: String,
    pub report: Option<SweepReport>,
}

#[derive(Serialize, ToSchema)]
pub struct SweepStatus {
    pub expiration_running: bool,
    pub overdue_running: bool,
}

async fn trigger(sweeper: &dyn Sweeper) -> AppResult<(StatusCode, Json<SweepResponse>)> {
    let run = sweeper.run_once().await?;
    let (code, status, report) = match run {
        SweepRun::Completed(report) => (StatusCode::OK, "completed", Some(report)),
        SweepRun::AlreadyRunning => (StatusCode::ACCEPTED, "already_running", None),
    };

    Ok((
        code,
        Json(SweepResponse {
            sweep: sweeper.name().to_string(),
            status: status.to_string(),
            report,
        }),
    ))
}

/// Expire ready reservations held past the grace period
#[utoipa::path(
    post,
    path = "/sweeps/expiration",
    tag = "sweeps",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Sweep completed", body = SweepResponse),
        (status = 202, description = "A run was already in progress", body = SweepResponse),
        (status = 403, description = "Librarian privileges required")
    )
)]
pub async fn run_expiration(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
) -> AppResult<(StatusCode, Json<SweepResponse>)> {
    caller.require_staff()?;
    trigger(&state.services.expiration).await
}

/// Send reminders for overdue loans
#[utoipa::path(
    post,
    path = "/sweeps/overdue",
    tag = "sweeps",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Sweep completed", body = SweepResponse),
        (status = 202, description = "A run was already in progress", body = SweepResponse),
        (status = 403, description = "Librarian privileges required")
    )
)]
pub async fn run_overdue(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
) -> AppResult<(StatusCode, Json<SweepResponse>)> {
    caller.require_staff()?;
    trigger(&state.services.overdue).await
}

/// Whether each sweep currently has a run in flight
#[utoipa::path(
    get,
    path = "/sweeps/status",
    tag = "sweeps",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Sweep status", body = SweepStatus),
        (status = 403, description = "Librarian privileges required")
    )
)]
pub async fn get_status(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
) -> AppResult<Json<SweepStatus>> {
    caller.require_staff()?;

    Ok(Json(SweepStatus {
        expiration_running: state.services.expiration.guard().is_running().await?,
        overdue_running: state.services.overdue.guard().is_running().await?,
    }))
}
