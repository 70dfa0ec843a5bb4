//! PostgreSQL implementation of the circulation store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Transaction};

use super::{
    books::BooksRepository, loans::LoansRepository, reservations::ReservationsRepository,
    users::UsersRepository, CirculationStore, StoreTx,
};
use crate::{
    error::AppResult,
    models::{
        book::Book,
        loan::{BorrowRecord, LoanStatus, NewBorrowRecord, OverdueLoan},
        reservation::{NewReservation, Reservation, ReservationQuery},
        user::User,
    },
};

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub books: BooksRepository,
    pub users: UsersRepository,
    pub loans: LoansRepository,
    pub reservations: ReservationsRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            books: BooksRepository::new(pool.clone()),
            users: UsersRepository::new(pool.clone()),
            loans: LoansRepository::new(pool.clone()),
            reservations: ReservationsRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl CirculationStore for Repository {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_book(&self, id: i32) -> AppResult<Option<Book>> {
        self.books.get_by_id(id).await
    }

    async fn get_user(&self, id: i32) -> AppResult<Option<User>> {
        self.users.get_by_id(id).await
    }

    async fn get_loan(&self, id: i32) -> AppResult<Option<BorrowRecord>> {
        self.loans.get_by_id(id).await
    }

    async fn get_reservation(&self, id: i32) -> AppResult<Option<Reservation>> {
        self.reservations.get_by_id(id).await
    }

    async fn list_user_loans(
        &self,
        user_id: i32,
        status: Option<LoanStatus>,
    ) -> AppResult<Vec<BorrowRecord>> {
        self.loans.get_user_loans(user_id, status).await
    }

    async fn list_user_reservations(
        &self,
        user_id: i32,
        query: &ReservationQuery,
    ) -> AppResult<(Vec<Reservation>, i64)> {
        self.reservations.list_for_user(user_id, query).await
    }

    async fn list_queue(&self, book_id: i32) -> AppResult<Vec<Reservation>> {
        self.reservations.list_queue(book_id).await
    }

    async fn stale_ready_reservations(
        &self,
        held_before: DateTime<Utc>,
    ) -> AppResult<Vec<Reservation>> {
        self.reservations.get_stale_ready(held_before).await
    }

    async fn overdue_loans(&self, now: DateTime<Utc>) -> AppResult<Vec<OverdueLoan>> {
        self.loans.get_overdue(now).await
    }

    async fn count_active_loans(&self) -> AppResult<i64> {
        self.loans.count_active().await
    }

    async fn count_overdue_loans(&self, now: DateTime<Utc>) -> AppResult<i64> {
        self.loans.count_overdue(now).await
    }
}

/// Open database transaction; rolled back by sqlx when dropped uncommitted
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn lock_book(&mut self, id: i32) -> AppResult<Option<Book>> {
        BooksRepository::lock(&mut self.tx, id).await
    }

    async fn update_book_stock(&mut self, book: &Book) -> AppResult<()> {
        BooksRepository::update_stock(&mut self.tx, book).await
    }

    async fn lock_user(&mut self, id: i32) -> AppResult<Option<User>> {
        UsersRepository::lock(&mut self.tx, id).await
    }

    async fn update_user_loan_count(&mut self, user: &User) -> AppResult<()> {
        UsersRepository::update_loan_count(&mut self.tx, user).await
    }

    async fn lock_loan(&mut self, id: i32) -> AppResult<Option<BorrowRecord>> {
        LoansRepository::lock(&mut self.tx, id).await
    }

    async fn insert_loan(&mut self, loan: &NewBorrowRecord) -> AppResult<BorrowRecord> {
        LoansRepository::insert(&mut self.tx, loan).await
    }

    async fn update_loan(&mut self, loan: &BorrowRecord) -> AppResult<()> {
        LoansRepository::update(&mut self.tx, loan).await
    }

    async fn count_open_loans(&mut self, user_id: i32, book_id: i32) -> AppResult<i64> {
        LoansRepository::count_open_for_title(&mut self.tx, user_id, book_id).await
    }

    async fn has_overdue_loans(&mut self, user_id: i32, now: DateTime<Utc>) -> AppResult<bool> {
        LoansRepository::has_overdue(&mut self.tx, user_id, now).await
    }

    async fn lock_reservation(&mut self, id: i32) -> AppResult<Option<Reservation>> {
        ReservationsRepository::lock(&mut self.tx, id).await
    }

    async fn has_active_reservation(&mut self, book_id: i32, user_id: i32) -> AppResult<bool> {
        ReservationsRepository::has_active(&mut self.tx, book_id, user_id).await
    }

    async fn ready_reservation(&mut self, book_id: i32) -> AppResult<Option<Reservation>> {
        ReservationsRepository::get_ready(&mut self.tx, book_id).await
    }

    async fn oldest_pending_reservation(
        &mut self,
        book_id: i32,
    ) -> AppResult<Option<Reservation>> {
        ReservationsRepository::lock_oldest_pending(&mut self.tx, book_id).await
    }

    async fn insert_reservation(
        &mut self,
        reservation: &NewReservation,
    ) -> AppResult<Reservation> {
        ReservationsRepository::insert(&mut self.tx, reservation).await
    }

    async fn update_reservation(&mut self, reservation: &Reservation) -> AppResult<()> {
        ReservationsRepository::update(&mut self.tx, reservation).await
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
