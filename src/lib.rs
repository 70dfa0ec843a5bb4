//! Elidune Circulation
//!
//! Reservation queue and circulation ledger for the Elidune library server:
//! borrowing, returning and renewing books, FIFO reservations with a hold
//! window, and the periodic sweeps that expire stale holds and remind
//! borrowers of overdue loans.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
