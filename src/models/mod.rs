//! Data models for the circulation core

pub mod book;
pub mod loan;
pub mod notification;
pub mod reservation;
pub mod user;

// Re-export commonly used types
pub use book::Book;
pub use loan::{BorrowRecord, LoanStatus};
pub use notification::{NewNotification, NotificationCategory, NotificationId, ReminderKey};
pub use reservation::{Reservation, ReservationStatus};
pub use user::{AuthContext, Role, User};
