//! Expiration sweep: releases ready reservations that were never collected

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::{
    notifications::NotificationPort,
    reservations::{announce_ready, promote_in},
    sweep::{SweepGuard, SweepReport, SweepRun, Sweeper},
};
use crate::{
    error::{AppError, AppResult},
    models::{
        notification::NewNotification,
        reservation::{Reservation, ReservationStatus},
    },
    repository::CirculationStore,
};

#[derive(Clone)]
pub struct ExpirationSweeper {
    store: Arc<dyn CirculationStore>,
    notifier: Arc<dyn NotificationPort>,
    grace_days: i64,
    guard: SweepGuard,
}

/// What committed for one expired reservation
struct Expired {
    reservation: Reservation,
    book_title: String,
    promoted: Option<Reservation>,
}

impl ExpirationSweeper {
    pub fn new(
        store: Arc<dyn CirculationStore>,
        notifier: Arc<dyn NotificationPort>,
        grace_days: i64,
        guard: SweepGuard,
    ) -> Self {
        Self {
            store,
            notifier,
            grace_days,
            guard,
        }
    }

    pub fn guard(&self) -> &SweepGuard {
        &self.guard
    }

    /// Run the sweep as if the clock read `now`
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> AppResult<SweepRun> {
        let Some(permit) = self.guard.try_enter().await? else {
            tracing::info!("Expiration sweep already running, skipping");
            return Ok(SweepRun::AlreadyRunning);
        };
        let result = self.sweep(now).await;
        permit.release().await;
        result.map(SweepRun::Completed)
    }

    async fn sweep(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let cutoff = now - Duration::days(self.grace_days);
        let candidates = self.store.stale_ready_reservations(cutoff).await?;
        let mut report = SweepReport::default();

        for candidate in candidates {
            report.examined += 1;
            match self.expire_one(&candidate, cutoff, now).await {
                Ok(Some(expired)) => {
                    report.processed += 1;
                    self.notify(&expired, &mut report).await;
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        reservation_id = candidate.id,
                        book_id = candidate.book_id,
                        "Failed to expire reservation: {}",
                        e
                    );
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            expired = report.processed,
            skipped = report.skipped,
            failed = report.failed,
            "Expiration sweep finished"
        );
        Ok(report)
    }

    /// Expire one reservation and promote the next in line, atomically.
    /// `None` when the reservation changed since it was selected.
    async fn expire_one(
        &self,
        candidate: &Reservation,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Expired>> {
        let mut tx = self.store.begin().await?;
        let book = tx.lock_book(candidate.book_id).await?.ok_or_else(|| {
            AppError::NotFound(format!("Book with id {} not found", candidate.book_id))
        })?;
        let Some(mut reservation) = tx.lock_reservation(candidate.id).await? else {
            return Ok(None);
        };
        if reservation.status != ReservationStatus::Ready || reservation.held_since() >= cutoff {
            return Ok(None);
        }

        reservation.expire(now)?;
        tx.update_reservation(&reservation).await?;
        let promoted = promote_in(tx.as_mut(), &book, now).await?;
        tx.commit().await?;

        tracing::info!(
            reservation_id = reservation.id,
            book_id = book.id,
            user_id = reservation.user_id,
            "Reservation expired"
        );
        Ok(Some(Expired {
            reservation,
            book_title: book.title,
            promoted,
        }))
    }

    async fn notify(&self, expired: &Expired, report: &mut SweepReport) {
        let notification =
            NewNotification::reservation_expired(expired.reservation.user_id, &expired.book_title);
        if let Err(e) = self.notifier.send(notification).await {
            report.notify_failures += 1;
            tracing::warn!(
                reservation_id = expired.reservation.id,
                user_id = expired.reservation.user_id,
                "Failed to send reservation expired notification: {}",
                e
            );
        }

        if let Some(next) = &expired.promoted {
            if !announce_ready(self.notifier.as_ref(), next, &expired.book_title, self.grace_days)
                .await
            {
                report.notify_failures += 1;
            }
        }
    }
}

#[async_trait]
impl Sweeper for ExpirationSweeper {
    fn name(&self) -> &'static str {
        "expiration"
    }

    async fn run_once(&self) -> AppResult<SweepRun> {
        self.run_once_at(Utc::now()).await
    }
}
