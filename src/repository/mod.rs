//! Repository layer for circulation storage
//!
//! Services talk to storage through [`CirculationStore`] for lock-free reads and
//! through a [`StoreTx`] for every read-then-write. Dropping a `StoreTx` without
//! calling [`StoreTx::commit`] rolls it back.
//!
//! Transactions lock rows in a fixed order: book, then the loan or reservation,
//! then the user. Services read a loan or reservation without locking only to
//! learn its book, then lock the book and re-read the row under lock.

pub mod books;
pub mod loans;
pub mod memory;
pub mod postgres;
pub mod reservations;
pub mod users;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    models::{
        book::Book,
        loan::{BorrowRecord, LoanStatus, NewBorrowRecord, OverdueLoan},
        reservation::{NewReservation, Reservation, ReservationQuery},
        user::User,
    },
};

pub use memory::MemoryStore;
pub use postgres::Repository;

/// Read access plus the entry point for transactions
#[async_trait]
pub trait CirculationStore: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>>;

    /// Cheap connectivity check used by readiness probes
    async fn ping(&self) -> AppResult<()>;

    async fn get_book(&self, id: i32) -> AppResult<Option<Book>>;

    async fn get_user(&self, id: i32) -> AppResult<Option<User>>;

    async fn get_loan(&self, id: i32) -> AppResult<Option<BorrowRecord>>;

    async fn get_reservation(&self, id: i32) -> AppResult<Option<Reservation>>;

    /// Loans of a user, most recent first
    async fn list_user_loans(
        &self,
        user_id: i32,
        status: Option<LoanStatus>,
    ) -> AppResult<Vec<BorrowRecord>>;

    /// Reservations of a user: pending, then ready (oldest first), then history
    /// (newest first). Returns the page and the unpaginated total.
    async fn list_user_reservations(
        &self,
        user_id: i32,
        query: &ReservationQuery,
    ) -> AppResult<(Vec<Reservation>, i64)>;

    /// Active reservations of a book: pending then ready, oldest first
    async fn list_queue(&self, book_id: i32) -> AppResult<Vec<Reservation>>;

    /// Ready reservations held since before `held_before`
    async fn stale_ready_reservations(
        &self,
        held_before: DateTime<Utc>,
    ) -> AppResult<Vec<Reservation>>;

    /// Out loans whose due date is before `now`
    async fn overdue_loans(&self, now: DateTime<Utc>) -> AppResult<Vec<OverdueLoan>>;

    async fn count_active_loans(&self) -> AppResult<i64>;

    async fn count_overdue_loans(&self, now: DateTime<Utc>) -> AppResult<i64>;
}

/// One atomic unit of work. `lock_*` methods hold the row until commit or drop.
#[async_trait]
pub trait StoreTx: Send {
    async fn lock_book(&mut self, id: i32) -> AppResult<Option<Book>>;

    /// Persist `available` and `times`
    async fn update_book_stock(&mut self, book: &Book) -> AppResult<()>;

    async fn lock_user(&mut self, id: i32) -> AppResult<Option<User>>;

    /// Persist `active_loan_count`
    async fn update_user_loan_count(&mut self, user: &User) -> AppResult<()>;

    async fn lock_loan(&mut self, id: i32) -> AppResult<Option<BorrowRecord>>;

    async fn insert_loan(&mut self, loan: &NewBorrowRecord) -> AppResult<BorrowRecord>;

    /// Persist status, due date, renew count and return instant
    async fn update_loan(&mut self, loan: &BorrowRecord) -> AppResult<()>;

    /// Number of out loans a user holds on one book
    async fn count_open_loans(&mut self, user_id: i32, book_id: i32) -> AppResult<i64>;

    async fn has_overdue_loans(&mut self, user_id: i32, now: DateTime<Utc>) -> AppResult<bool>;

    async fn lock_reservation(&mut self, id: i32) -> AppResult<Option<Reservation>>;

    async fn has_active_reservation(&mut self, book_id: i32, user_id: i32) -> AppResult<bool>;

    async fn ready_reservation(&mut self, book_id: i32) -> AppResult<Option<Reservation>>;

    /// Oldest pending reservation by `(created_at, id)`, locked
    async fn oldest_pending_reservation(&mut self, book_id: i32)
        -> AppResult<Option<Reservation>>;

    async fn insert_reservation(&mut self, reservation: &NewReservation)
        -> AppResult<Reservation>;

    /// Persist status and the lifecycle timestamps
    async fn update_reservation(&mut self, reservation: &Reservation) -> AppResult<()>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}
