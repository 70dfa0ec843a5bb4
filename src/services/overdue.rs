//! Overdue sweep: one reminder per overdue loan until the patron reads it

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{
    notifications::NotificationPort,
    sweep::{SweepGuard, SweepReport, SweepRun, Sweeper},
};
use crate::{
    error::AppResult,
    models::{
        loan::OverdueLoan,
        notification::{NewNotification, ReminderKey},
    },
    repository::CirculationStore,
};

#[derive(Clone)]
pub struct OverdueSweeper {
    store: Arc<dyn CirculationStore>,
    notifier: Arc<dyn NotificationPort>,
    guard: SweepGuard,
}

impl OverdueSweeper {
    pub fn new(
        store: Arc<dyn CirculationStore>,
        notifier: Arc<dyn NotificationPort>,
        guard: SweepGuard,
    ) -> Self {
        Self {
            store,
            notifier,
            guard,
        }
    }

    pub fn guard(&self) -> &SweepGuard {
        &self.guard
    }

    /// Run the sweep as if the clock read `now`
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> AppResult<SweepRun> {
        let Some(permit) = self.guard.try_enter().await? else {
            tracing::info!("Overdue sweep already running, skipping");
            return Ok(SweepRun::AlreadyRunning);
        };
        let result = self.sweep(now).await;
        permit.release().await;
        result.map(SweepRun::Completed)
    }

    async fn sweep(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let overdue = self.store.overdue_loans(now).await?;
        let mut report = SweepReport::default();

        for loan in overdue {
            report.examined += 1;
            match self.remind(&loan, now).await {
                Ok(true) => report.processed += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    report.notify_failures += 1;
                    tracing::warn!(
                        loan_id = loan.record.id,
                        user_id = loan.record.user_id,
                        "Failed to send overdue reminder: {}",
                        e
                    );
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            reminded = report.processed,
            suppressed = report.skipped,
            failed = report.failed,
            "Overdue sweep finished"
        );
        Ok(report)
    }

    /// `false` when an unread reminder for this loan is already waiting
    async fn remind(&self, loan: &OverdueLoan, now: DateTime<Utc>) -> AppResult<bool> {
        let record = &loan.record;
        let key = ReminderKey {
            book_id: record.book_id,
            due_date: record.due_date,
        };

        if self.notifier.has_unread_reminder(record.user_id, &key).await? {
            tracing::debug!(loan_id = record.id, "Unread overdue reminder exists, skipping");
            return Ok(false);
        }

        let overdue_days = record.overdue_days(now);
        self.notifier
            .send(NewNotification::overdue_reminder(
                record.user_id,
                &loan.title,
                key,
                overdue_days,
            ))
            .await?;

        tracing::info!(
            loan_id = record.id,
            user_id = record.user_id,
            overdue_days,
            "Overdue reminder sent"
        );
        Ok(true)
    }
}

#[async_trait]
impl Sweeper for OverdueSweeper {
    fn name(&self) -> &'static str {
        "overdue"
    }

    async fn run_once(&self) -> AppResult<SweepRun> {
        self.run_once_at(Utc::now()).await
    }
}
