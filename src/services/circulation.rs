//! Circulation ledger: borrow, return and renew
//!
//! Every mutation of book stock and user loan counters goes through
//! [`borrow_in`] or the return path below, inside a single store transaction.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::{ensure_owner, notifications::NotificationPort, reservations};
use crate::{
    config::CirculationConfig,
    error::{AppError, AppResult, Policy},
    models::{
        book::Book,
        loan::{BorrowRecord, LoanStatus, NewBorrowRecord},
    },
    repository::{CirculationStore, StoreTx},
};

#[derive(Clone)]
pub struct CirculationLedger {
    store: Arc<dyn CirculationStore>,
    notifier: Arc<dyn NotificationPort>,
    rules: CirculationConfig,
    grace_days: i64,
}

/// Lend one copy of a locked book to a user.
///
/// The caller must already hold the book lock; the user row is locked here.
/// Checks run before anything is written, in this order: user exists, stock,
/// borrow limit, same-title limit.
pub(crate) async fn borrow_in(
    tx: &mut dyn StoreTx,
    rules: &CirculationConfig,
    book: &mut Book,
    user_id: i32,
    now: DateTime<Utc>,
) -> AppResult<BorrowRecord> {
    let mut user = tx
        .lock_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user_id)))?;

    if !book.has_stock() {
        return Err(AppError::PolicyViolation(Policy::OutOfStock));
    }
    if !user.can_borrow() {
        return Err(AppError::PolicyViolation(Policy::MaxBorrowLimit));
    }
    if tx.count_open_loans(user_id, book.id).await? >= rules.same_title_limit {
        return Err(AppError::PolicyViolation(Policy::SameTitleTwice));
    }

    book.check_out()?;
    tx.update_book_stock(book).await?;

    let record = tx
        .insert_loan(&NewBorrowRecord {
            book_id: book.id,
            user_id,
            begin_date: now,
            due_date: now + Duration::days(rules.loan_days),
        })
        .await?;

    user.loan_opened();
    tx.update_user_loan_count(&user).await?;

    Ok(record)
}

impl CirculationLedger {
    pub fn new(
        store: Arc<dyn CirculationStore>,
        notifier: Arc<dyn NotificationPort>,
        rules: CirculationConfig,
        grace_days: i64,
    ) -> Self {
        Self {
            store,
            notifier,
            rules,
            grace_days,
        }
    }

    /// Borrow a book directly from the shelf
    pub async fn borrow(&self, book_id: i32, user_id: i32) -> AppResult<BorrowRecord> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let mut book = tx
            .lock_book(book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;

        let record = borrow_in(tx.as_mut(), &self.rules, &mut book, user_id, now).await?;
        tx.commit().await?;

        tracing::info!(
            loan_id = record.id,
            book_id,
            user_id,
            available = book.available,
            "Book borrowed"
        );
        Ok(record)
    }

    /// Return a borrowed book and hand the freed copy to the reservation queue
    pub async fn return_book(&self, record_id: i32, user_id: i32) -> AppResult<BorrowRecord> {
        let now = Utc::now();
        let loan = self.load_owned(record_id, user_id).await?;

        let mut tx = self.store.begin().await?;
        let mut book = tx.lock_book(loan.book_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("Book with id {} not found", loan.book_id))
        })?;
        let mut loan = tx
            .lock_loan(record_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", record_id)))?;

        loan.mark_returned(now)?;
        tx.update_loan(&loan).await?;

        book.check_in()?;
        tx.update_book_stock(&book).await?;

        let mut user = tx.lock_user(loan.user_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("User with id {} not found", loan.user_id))
        })?;
        user.loan_closed();
        tx.update_user_loan_count(&user).await?;

        let promoted = reservations::promote_in(tx.as_mut(), &book, now).await?;
        tx.commit().await?;

        tracing::info!(
            loan_id = loan.id,
            book_id = book.id,
            user_id,
            available = book.available,
            "Book returned"
        );

        if let Some(reservation) = promoted {
            reservations::announce_ready(
                self.notifier.as_ref(),
                &reservation,
                &book.title,
                self.grace_days,
            )
            .await;
        }
        Ok(loan)
    }

    /// Extend a loan from its current due date
    pub async fn renew(&self, record_id: i32, user_id: i32) -> AppResult<BorrowRecord> {
        self.load_owned(record_id, user_id).await?;

        let mut tx = self.store.begin().await?;
        let mut loan = tx
            .lock_loan(record_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", record_id)))?;

        loan.extend(self.rules.renew_days)?;
        tx.update_loan(&loan).await?;
        tx.commit().await?;

        tracing::info!(
            loan_id = loan.id,
            user_id,
            due_date = %loan.due_date,
            renew_count = loan.renew_count,
            "Loan renewed"
        );
        Ok(loan)
    }

    /// Loans of a user, most recent first
    pub async fn list_user_loans(
        &self,
        user_id: i32,
        status: Option<LoanStatus>,
    ) -> AppResult<Vec<BorrowRecord>> {
        self.store.list_user_loans(user_id, status).await
    }

    /// Count active loans
    pub async fn count_active(&self) -> AppResult<i64> {
        self.store.count_active_loans().await
    }

    /// Count overdue loans
    pub async fn count_overdue(&self) -> AppResult<i64> {
        self.store.count_overdue_loans(Utc::now()).await
    }

    async fn load_owned(&self, record_id: i32, user_id: i32) -> AppResult<BorrowRecord> {
        let loan = self
            .store
            .get_loan(record_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", record_id)))?;
        ensure_owner(user_id, loan.user_id, "loan")?;
        Ok(loan)
    }
}
