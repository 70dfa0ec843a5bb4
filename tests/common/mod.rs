//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use elidune_circulation::{
    config::AppConfig,
    models::{book::Book, loan::LoanStatus, notification::NotificationCategory},
    repository::MemoryStore,
    services::{notifications::InMemoryNotifier, Services},
};

/// Services wired to an in-process store and inbox
pub struct Harness {
    pub store: MemoryStore,
    pub notifier: InMemoryNotifier,
    pub services: Services,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let store = MemoryStore::new();
        let notifier = InMemoryNotifier::new(store.clone());
        let services = Services::new(
            Arc::new(store.clone()),
            Arc::new(notifier.clone()),
            &config,
            None,
        );
        Self {
            store,
            notifier,
            services,
        }
    }

    pub async fn book(&self, id: i32) -> Book {
        self.store.snapshot().await.books[&id].clone()
    }

    /// Notifications of one category sent to one user
    pub async fn inbox(&self, receiver_id: i32, category: NotificationCategory) -> usize {
        self.notifier
            .sent()
            .await
            .iter()
            .filter(|s| {
                s.notification.receiver_id == receiver_id
                    && s.notification.category == category
            })
            .count()
    }

    /// Stock bounds, loan counters and the single-ready rule hold everywhere
    pub async fn assert_consistent(&self) {
        let state = self.store.snapshot().await;

        for book in state.books.values() {
            assert!(
                book.available >= 0 && book.available <= book.total,
                "book {} stock out of bounds: {}/{}",
                book.id,
                book.available,
                book.total
            );
            let out = state
                .loans
                .values()
                .filter(|l| l.book_id == book.id && l.status == LoanStatus::Out)
                .count() as i32;
            assert_eq!(book.total - book.available, out, "book {} stock drift", book.id);

            let ready = state
                .reservations
                .values()
                .filter(|r| {
                    r.book_id == book.id
                        && r.status == elidune_circulation::models::ReservationStatus::Ready
                })
                .count();
            assert!(ready <= 1, "book {} has {} ready reservations", book.id, ready);
        }

        for user in state.users.values() {
            let out = state
                .loans
                .values()
                .filter(|l| l.user_id == user.id && l.status == LoanStatus::Out)
                .count() as i32;
            assert_eq!(user.active_loan_count, out, "user {} counter drift", user.id);
        }
    }
}
