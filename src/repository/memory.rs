//! In-process circulation store
//!
//! Transactions take a single store-wide lock and work on a copy of the state
//! that replaces the shared one on commit, so they are serialized and atomic.
//! Used by the test suites.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{CirculationStore, StoreTx};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::Book,
        loan::{BorrowRecord, LoanStatus, NewBorrowRecord, OverdueLoan},
        reservation::{NewReservation, Reservation, ReservationQuery, ReservationStatus},
        user::User,
    },
};

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub books: BTreeMap<i32, Book>,
    pub users: BTreeMap<i32, User>,
    pub loans: BTreeMap<i32, BorrowRecord>,
    pub reservations: BTreeMap<i32, Reservation>,
    last_id: i32,
}

impl MemoryState {
    fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }

    fn open_loans(&self, user_id: i32) -> impl Iterator<Item = &BorrowRecord> {
        self.loans
            .values()
            .filter(move |l| l.user_id == user_id && l.status == LoanStatus::Out)
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the committed state
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    pub async fn add_book(&self, title: &str, total: i32) -> Book {
        let mut state = self.state.lock().await;
        let book = Book {
            id: state.next_id(),
            title: title.to_string(),
            author: None,
            total,
            available: total,
            times: 0,
        };
        state.books.insert(book.id, book.clone());
        book
    }

    pub async fn add_user(&self, max_borrow: i32) -> User {
        let mut state = self.state.lock().await;
        let user = User {
            id: state.next_id(),
            firstname: None,
            lastname: None,
            max_borrow,
            active_loan_count: 0,
        };
        state.users.insert(user.id, user.clone());
        user
    }

    /// Insert an out loan with explicit dates, keeping stock and counters consistent
    pub async fn seed_loan(
        &self,
        book_id: i32,
        user_id: i32,
        begin_date: DateTime<Utc>,
        due_date: DateTime<Utc>,
    ) -> AppResult<BorrowRecord> {
        let mut state = self.state.lock().await;
        let book = state
            .books
            .get_mut(&book_id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;
        book.check_out()?;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user_id)))?;
        user.loan_opened();

        let record = BorrowRecord {
            id: state.next_id(),
            book_id,
            user_id,
            begin_date,
            due_date,
            status: LoanStatus::Out,
            renew_count: 0,
            returned_at: None,
        };
        state.loans.insert(record.id, record.clone());
        Ok(record)
    }

    /// Insert a reservation with explicit timestamps and status
    pub async fn seed_reservation(
        &self,
        book_id: i32,
        user_id: i32,
        created_at: DateTime<Utc>,
        status: ReservationStatus,
        ready_at: Option<DateTime<Utc>>,
    ) -> Reservation {
        let mut state = self.state.lock().await;
        let reservation = Reservation {
            id: state.next_id(),
            book_id,
            user_id,
            created_at,
            status,
            ready_at,
            closed_at: None,
            cancel_reason: None,
            loan_id: None,
        };
        state.reservations.insert(reservation.id, reservation.clone());
        reservation
    }

    pub async fn user_exists(&self, user_id: i32) -> bool {
        self.state.lock().await.users.contains_key(&user_id)
    }
}

fn active_queue(state: &MemoryState, book_id: i32) -> Vec<Reservation> {
    let mut queue: Vec<Reservation> = state
        .reservations
        .values()
        .filter(|r| r.book_id == book_id && r.status.is_active())
        .cloned()
        .collect();
    queue.sort_by_key(|r| (r.status.listing_rank(), r.queue_key()));
    queue
}

#[async_trait]
impl CirculationStore for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx { guard, work }))
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn get_book(&self, id: i32) -> AppResult<Option<Book>> {
        Ok(self.state.lock().await.books.get(&id).cloned())
    }

    async fn get_user(&self, id: i32) -> AppResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn get_loan(&self, id: i32) -> AppResult<Option<BorrowRecord>> {
        Ok(self.state.lock().await.loans.get(&id).cloned())
    }

    async fn get_reservation(&self, id: i32) -> AppResult<Option<Reservation>> {
        Ok(self.state.lock().await.reservations.get(&id).cloned())
    }

    async fn list_user_loans(
        &self,
        user_id: i32,
        status: Option<LoanStatus>,
    ) -> AppResult<Vec<BorrowRecord>> {
        let state = self.state.lock().await;
        let mut loans: Vec<BorrowRecord> = state
            .loans
            .values()
            .filter(|l| l.user_id == user_id && status.map_or(true, |s| l.status == s))
            .cloned()
            .collect();
        loans.sort_by(|a, b| (b.begin_date, b.id).cmp(&(a.begin_date, a.id)));
        Ok(loans)
    }

    async fn list_user_reservations(
        &self,
        user_id: i32,
        query: &ReservationQuery,
    ) -> AppResult<(Vec<Reservation>, i64)> {
        let state = self.state.lock().await;
        let mut rows: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|r| r.user_id == user_id && query.status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            let rank = a.status.listing_rank().cmp(&b.status.listing_rank());
            let within = if a.status.is_active() {
                a.queue_key().cmp(&b.queue_key())
            } else {
                (b.created_at, a.id).cmp(&(a.created_at, b.id))
            };
            rank.then(within)
        });
        let total = rows.len() as i64;
        let page = rows
            .into_iter()
            .skip(query.offset().max(0) as usize)
            .take(query.limit().max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn list_queue(&self, book_id: i32) -> AppResult<Vec<Reservation>> {
        Ok(active_queue(&*self.state.lock().await, book_id))
    }

    async fn stale_ready_reservations(
        &self,
        held_before: DateTime<Utc>,
    ) -> AppResult<Vec<Reservation>> {
        let state = self.state.lock().await;
        let mut rows: Vec<Reservation> = state
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Ready && r.held_since() < held_before)
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.held_since(), r.id));
        Ok(rows)
    }

    async fn overdue_loans(&self, now: DateTime<Utc>) -> AppResult<Vec<OverdueLoan>> {
        let state = self.state.lock().await;
        let mut rows: Vec<OverdueLoan> = state
            .loans
            .values()
            .filter(|l| l.is_overdue(now))
            .map(|l| OverdueLoan {
                title: state
                    .books
                    .get(&l.book_id)
                    .map(|b| b.title.clone())
                    .unwrap_or_default(),
                record: l.clone(),
            })
            .collect();
        rows.sort_by_key(|o| (o.record.due_date, o.record.id));
        Ok(rows)
    }

    async fn count_active_loans(&self) -> AppResult<i64> {
        let state = self.state.lock().await;
        Ok(state.loans.values().filter(|l| l.is_out()).count() as i64)
    }

    async fn count_overdue_loans(&self, now: DateTime<Utc>) -> AppResult<i64> {
        let state = self.state.lock().await;
        Ok(state.loans.values().filter(|l| l.is_overdue(now)).count() as i64)
    }
}

/// Holds the store lock for its whole lifetime; `work` replaces the shared state on commit
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

impl MemoryTx {
    fn missing(kind: &str, id: i32) -> AppError {
        AppError::NotFound(format!("{} with id {} not found", kind, id))
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_book(&mut self, id: i32) -> AppResult<Option<Book>> {
        Ok(self.work.books.get(&id).cloned())
    }

    async fn update_book_stock(&mut self, book: &Book) -> AppResult<()> {
        let stored = self
            .work
            .books
            .get_mut(&book.id)
            .ok_or_else(|| Self::missing("Book", book.id))?;
        stored.available = book.available;
        stored.times = book.times;
        Ok(())
    }

    async fn lock_user(&mut self, id: i32) -> AppResult<Option<User>> {
        Ok(self.work.users.get(&id).cloned())
    }

    async fn update_user_loan_count(&mut self, user: &User) -> AppResult<()> {
        let stored = self
            .work
            .users
            .get_mut(&user.id)
            .ok_or_else(|| Self::missing("User", user.id))?;
        stored.active_loan_count = user.active_loan_count;
        Ok(())
    }

    async fn lock_loan(&mut self, id: i32) -> AppResult<Option<BorrowRecord>> {
        Ok(self.work.loans.get(&id).cloned())
    }

    async fn insert_loan(&mut self, loan: &NewBorrowRecord) -> AppResult<BorrowRecord> {
        let record = BorrowRecord {
            id: self.work.next_id(),
            book_id: loan.book_id,
            user_id: loan.user_id,
            begin_date: loan.begin_date,
            due_date: loan.due_date,
            status: LoanStatus::Out,
            renew_count: 0,
            returned_at: None,
        };
        self.work.loans.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_loan(&mut self, loan: &BorrowRecord) -> AppResult<()> {
        let stored = self
            .work
            .loans
            .get_mut(&loan.id)
            .ok_or_else(|| Self::missing("Loan", loan.id))?;
        stored.status = loan.status;
        stored.due_date = loan.due_date;
        stored.renew_count = loan.renew_count;
        stored.returned_at = loan.returned_at;
        Ok(())
    }

    async fn count_open_loans(&mut self, user_id: i32, book_id: i32) -> AppResult<i64> {
        Ok(self
            .work
            .open_loans(user_id)
            .filter(|l| l.book_id == book_id)
            .count() as i64)
    }

    async fn has_overdue_loans(&mut self, user_id: i32, now: DateTime<Utc>) -> AppResult<bool> {
        Ok(self.work.open_loans(user_id).any(|l| l.due_date < now))
    }

    async fn lock_reservation(&mut self, id: i32) -> AppResult<Option<Reservation>> {
        Ok(self.work.reservations.get(&id).cloned())
    }

    async fn has_active_reservation(&mut self, book_id: i32, user_id: i32) -> AppResult<bool> {
        Ok(self
            .work
            .reservations
            .values()
            .any(|r| r.book_id == book_id && r.user_id == user_id && r.status.is_active()))
    }

    async fn ready_reservation(&mut self, book_id: i32) -> AppResult<Option<Reservation>> {
        Ok(self
            .work
            .reservations
            .values()
            .find(|r| r.book_id == book_id && r.status == ReservationStatus::Ready)
            .cloned())
    }

    async fn oldest_pending_reservation(
        &mut self,
        book_id: i32,
    ) -> AppResult<Option<Reservation>> {
        Ok(self
            .work
            .reservations
            .values()
            .filter(|r| r.book_id == book_id && r.status == ReservationStatus::Pending)
            .min_by_key(|r| r.queue_key())
            .cloned())
    }

    async fn insert_reservation(
        &mut self,
        reservation: &NewReservation,
    ) -> AppResult<Reservation> {
        let record = Reservation {
            id: self.work.next_id(),
            book_id: reservation.book_id,
            user_id: reservation.user_id,
            created_at: reservation.created_at,
            status: ReservationStatus::Pending,
            ready_at: None,
            closed_at: None,
            cancel_reason: None,
            loan_id: None,
        };
        self.work.reservations.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_reservation(&mut self, reservation: &Reservation) -> AppResult<()> {
        let stored = self
            .work
            .reservations
            .get_mut(&reservation.id)
            .ok_or_else(|| Self::missing("Reservation", reservation.id))?;
        stored.status = reservation.status;
        stored.ready_at = reservation.ready_at;
        stored.closed_at = reservation.closed_at;
        stored.cancel_reason = reservation.cancel_reason.clone();
        stored.loan_id = reservation.loan_id;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_uncommitted_changes_are_discarded() {
        let store = MemoryStore::new();
        let book = store.add_book("Dune", 1).await;

        let mut tx = store.begin().await.unwrap();
        let mut locked = tx.lock_book(book.id).await.unwrap().unwrap();
        locked.check_out().unwrap();
        tx.update_book_stock(&locked).await.unwrap();
        drop(tx);

        assert_eq!(store.get_book(book.id).await.unwrap().unwrap().available, 1);

        let mut tx = store.begin().await.unwrap();
        tx.update_book_stock(&locked).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.get_book(book.id).await.unwrap().unwrap().available, 0);
    }

    #[tokio::test]
    async fn test_oldest_pending_breaks_ties_by_id() {
        let store = MemoryStore::new();
        let book = store.add_book("Dune", 1).await;
        let at = Utc::now();
        let first = store
            .seed_reservation(book.id, 10, at, ReservationStatus::Pending, None)
            .await;
        store
            .seed_reservation(book.id, 11, at, ReservationStatus::Pending, None)
            .await;

        let mut tx = store.begin().await.unwrap();
        let oldest = tx.oldest_pending_reservation(book.id).await.unwrap().unwrap();
        assert_eq!(oldest.id, first.id);
    }
}
