//! Reservation queue: order, cancel, convert to loan and FIFO promotion

use std::sync::Arc;

use chrono::{DateTime, Utc};
use validator::Validate;

use super::{circulation, ensure_owner, notifications::NotificationPort};
use crate::{
    config::CirculationConfig,
    error::{AppError, AppResult, Policy},
    models::{
        book::Book,
        loan::BorrowRecord,
        notification::NewNotification,
        reservation::{NewReservation, Reservation, ReservationPage, ReservationQuery, ReservationStatus},
    },
    repository::{CirculationStore, StoreTx},
};

#[derive(Clone)]
pub struct ReservationQueueManager {
    store: Arc<dyn CirculationStore>,
    notifier: Arc<dyn NotificationPort>,
    rules: CirculationConfig,
    grace_days: i64,
}

/// Move the oldest pending reservation of a locked book to Ready.
///
/// Does nothing when the book has no copy on the shelf or a reservation is
/// already Ready for it. Returns the promoted reservation.
pub(crate) async fn promote_in(
    tx: &mut dyn StoreTx,
    book: &Book,
    now: DateTime<Utc>,
) -> AppResult<Option<Reservation>> {
    if !book.has_stock() {
        return Ok(None);
    }
    if tx.ready_reservation(book.id).await?.is_some() {
        return Ok(None);
    }
    let Some(mut next) = tx.oldest_pending_reservation(book.id).await? else {
        return Ok(None);
    };

    next.promote(now)?;
    tx.update_reservation(&next).await?;

    tracing::info!(
        reservation_id = next.id,
        book_id = book.id,
        user_id = next.user_id,
        "Reservation promoted to ready"
    );
    Ok(Some(next))
}

/// Tell a patron their copy is held. Delivery failures never undo the promotion.
pub(crate) async fn announce_ready(
    notifier: &dyn NotificationPort,
    reservation: &Reservation,
    book_title: &str,
    grace_days: i64,
) -> bool {
    let notification =
        NewNotification::reservation_ready(reservation.user_id, book_title, grace_days);
    match notifier.send(notification).await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(
                reservation_id = reservation.id,
                user_id = reservation.user_id,
                "Failed to send reservation ready notification: {}",
                e
            );
            false
        }
    }
}

impl ReservationQueueManager {
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

    /// Reserve a book that has no copy on the shelf
    pub async fn order(&self, book_id: i32, user_id: i32) -> AppResult<Reservation> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;

        let book = tx
            .lock_book(book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;
        if book.has_stock() {
            return Err(AppError::PolicyViolation(Policy::BookCurrentlyAvailable));
        }

        tx.lock_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", user_id)))?;
        if tx.has_active_reservation(book_id, user_id).await? {
            return Err(AppError::PolicyViolation(Policy::AlreadyReserved));
        }
        if tx.has_overdue_loans(user_id, now).await? {
            return Err(AppError::PolicyViolation(Policy::HasOverdueRecords));
        }

        let reservation = tx
            .insert_reservation(&NewReservation {
                book_id,
                user_id,
                created_at: now,
            })
            .await?;
        let promoted = promote_in(tx.as_mut(), &book, now).await?;
        tx.commit().await?;

        tracing::info!(reservation_id = reservation.id, book_id, user_id, "Reservation created");

        match promoted {
            Some(ready) => {
                announce_ready(self.notifier.as_ref(), &ready, &book.title, self.grace_days).await;
                if ready.id == reservation.id {
                    return Ok(ready);
                }
                Ok(reservation)
            }
            None => Ok(reservation),
        }
    }

    /// Cancel a pending or ready reservation; a freed hold passes to the next in line
    pub async fn cancel(
        &self,
        reservation_id: i32,
        user_id: i32,
        reason: Option<String>,
    ) -> AppResult<Reservation> {
        let now = Utc::now();
        let peek = self.load_owned(reservation_id, user_id).await?;

        let mut tx = self.store.begin().await?;
        let book = self.lock_book_of(tx.as_mut(), &peek).await?;
        let mut reservation = self.lock_reservation(tx.as_mut(), reservation_id).await?;

        let was_ready = reservation.status == ReservationStatus::Ready;
        reservation.cancel(reason, now)?;
        tx.update_reservation(&reservation).await?;

        let promoted = if was_ready {
            promote_in(tx.as_mut(), &book, now).await?
        } else {
            None
        };
        tx.commit().await?;

        tracing::info!(
            reservation_id,
            book_id = book.id,
            user_id,
            was_ready,
            "Reservation cancelled"
        );

        if let Some(next) = promoted {
            announce_ready(self.notifier.as_ref(), &next, &book.title, self.grace_days).await;
        }
        Ok(reservation)
    }

    /// Turn a ready reservation into a loan. Nothing is written if the borrow fails.
    pub async fn convert_to_loan(
        &self,
        reservation_id: i32,
        user_id: i32,
    ) -> AppResult<BorrowRecord> {
        let now = Utc::now();
        let peek = self.load_owned(reservation_id, user_id).await?;

        let mut tx = self.store.begin().await?;
        let mut book = self.lock_book_of(tx.as_mut(), &peek).await?;
        let mut reservation = self.lock_reservation(tx.as_mut(), reservation_id).await?;

        if reservation.status != ReservationStatus::Ready {
            return Err(AppError::Conflict(format!(
                "Reservation {} is {}, not ready",
                reservation_id, reservation.status
            )));
        }
        if !book.has_stock() {
            return Err(AppError::PolicyViolation(Policy::BookCurrentlyUnavailable));
        }

        let record =
            circulation::borrow_in(tx.as_mut(), &self.rules, &mut book, user_id, now).await?;
        reservation.complete(record.id, now)?;
        tx.update_reservation(&reservation).await?;

        // Another copy may still be on the shelf for the next patron
        let promoted = promote_in(tx.as_mut(), &book, now).await?;
        tx.commit().await?;

        tracing::info!(
            reservation_id,
            loan_id = record.id,
            book_id = book.id,
            user_id,
            "Reservation converted to loan"
        );

        if let Some(next) = promoted {
            announce_ready(self.notifier.as_ref(), &next, &book.title, self.grace_days).await;
        }
        Ok(record)
    }

    /// Promote the next pending reservation of a book if a copy is free
    pub async fn promote(&self, book_id: i32) -> AppResult<Option<Reservation>> {
        let now = Utc::now();
        let mut tx = self.store.begin().await?;
        let book = tx
            .lock_book(book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;

        let promoted = promote_in(tx.as_mut(), &book, now).await?;
        tx.commit().await?;

        if let Some(ref next) = promoted {
            announce_ready(self.notifier.as_ref(), next, &book.title, self.grace_days).await;
        }
        Ok(promoted)
    }

    /// Reservations of a user, pending first, then ready, then history
    pub async fn list_user_orders(
        &self,
        user_id: i32,
        query: &ReservationQuery,
    ) -> AppResult<ReservationPage> {
        query.validate()?;
        let (items, total) = self.store.list_user_reservations(user_id, query).await?;
        Ok(ReservationPage {
            items,
            total,
            page: query.page.unwrap_or(1),
            per_page: query.limit(),
        })
    }

    /// Active queue of a book, pending first then ready
    pub async fn list_queue(&self, book_id: i32) -> AppResult<Vec<Reservation>> {
        self.store
            .get_book(book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", book_id)))?;
        self.store.list_queue(book_id).await
    }

    async fn load_owned(&self, reservation_id: i32, user_id: i32) -> AppResult<Reservation> {
        let reservation = self
            .store
            .get_reservation(reservation_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Reservation with id {} not found", reservation_id))
            })?;
        ensure_owner(user_id, reservation.user_id, "reservation")?;
        Ok(reservation)
    }

    async fn lock_book_of(&self, tx: &mut dyn StoreTx, reservation: &Reservation) -> AppResult<Book> {
        tx.lock_book(reservation.book_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("Book with id {} not found", reservation.book_id))
        })
    }

    async fn lock_reservation(&self, tx: &mut dyn StoreTx, reservation_id: i32) -> AppResult<Reservation> {
        tx.lock_reservation(reservation_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("Reservation with id {} not found", reservation_id))
        })
    }
}
