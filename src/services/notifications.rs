//! Notification port and its adapters
//!
//! The circulation core only hands over notification requests; how they reach
//! the patron (in-app inbox, e-mail) belongs to the collaborator behind
//! [`NotificationPort`].

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use tokio::sync::Mutex;

use crate::{
    error::NotifyError,
    models::notification::{NewNotification, NotificationId, ReminderKey},
    repository::MemoryStore,
};

#[async_trait]
pub trait NotificationPort: Send + Sync {
    /// Queue a notification for a user
    async fn send(&self, notification: NewNotification) -> Result<NotificationId, NotifyError>;

    /// Whether the user still has an unread reminder about this loan
    async fn has_unread_reminder(
        &self,
        receiver_id: i32,
        key: &ReminderKey,
    ) -> Result<bool, NotifyError>;
}

/// Writes notifications to the shared `notifications` table read by the inbox service
#[derive(Clone)]
pub struct PgNotifier {
    pool: Pool<Postgres>,
}

impl PgNotifier {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationPort for PgNotifier {
    async fn send(&self, notification: NewNotification) -> Result<NotificationId, NotifyError> {
        let receiver_id = notification.receiver_id;
        sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO notifications (receiver_id, title, content, category, book_id, due_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(notification.receiver_id)
        .bind(&notification.title)
        .bind(&notification.content)
        .bind(notification.category.as_str())
        .bind(notification.reference.map(|r| r.book_id))
        .bind(notification.reference.map(|r| r.due_date))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                NotifyError::ReceiverNotFound(receiver_id)
            }
            e => NotifyError::Delivery(e.to_string()),
        })
    }

    async fn has_unread_reminder(
        &self,
        receiver_id: i32,
        key: &ReminderKey,
    ) -> Result<bool, NotifyError> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM notifications
                WHERE receiver_id = $1 AND category = 'overdue_reminder'
                  AND book_id = $2 AND due_date = $3 AND is_read = FALSE
            )
            "#,
        )
        .bind(receiver_id)
        .bind(key.book_id)
        .bind(key.due_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| NotifyError::Delivery(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredNotification {
    pub id: NotificationId,
    pub notification: NewNotification,
    pub is_read: bool,
}

/// Inbox kept in memory, paired with a [`MemoryStore`] for receiver lookups
#[derive(Clone)]
pub struct InMemoryNotifier {
    store: MemoryStore,
    inbox: Arc<Mutex<Vec<StoredNotification>>>,
}

impl InMemoryNotifier {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            store,
            inbox: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn sent(&self) -> Vec<StoredNotification> {
        self.inbox.lock().await.clone()
    }

    pub async fn mark_all_read(&self, receiver_id: i32) {
        for stored in self.inbox.lock().await.iter_mut() {
            if stored.notification.receiver_id == receiver_id {
                stored.is_read = true;
            }
        }
    }
}

#[async_trait]
impl NotificationPort for InMemoryNotifier {
    async fn send(&self, notification: NewNotification) -> Result<NotificationId, NotifyError> {
        if !self.store.user_exists(notification.receiver_id).await {
            return Err(NotifyError::ReceiverNotFound(notification.receiver_id));
        }
        let mut inbox = self.inbox.lock().await;
        let id = inbox.len() as NotificationId + 1;
        inbox.push(StoredNotification {
            id,
            notification,
            is_read: false,
        });
        Ok(id)
    }

    async fn has_unread_reminder(
        &self,
        receiver_id: i32,
        key: &ReminderKey,
    ) -> Result<bool, NotifyError> {
        Ok(self.inbox.lock().await.iter().any(|stored| {
            !stored.is_read
                && stored.notification.receiver_id == receiver_id
                && stored.notification.reference.as_ref() == Some(key)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_unknown_receiver() {
        let store = MemoryStore::new();
        let notifier = InMemoryNotifier::new(store);
        let result = notifier
            .send(NewNotification::reservation_expired(42, "Dune"))
            .await;
        assert!(matches!(result, Err(NotifyError::ReceiverNotFound(42))));
    }

    #[tokio::test]
    async fn test_unread_reminder_lookup() {
        let store = MemoryStore::new();
        let user = store.add_user(3).await;
        let notifier = InMemoryNotifier::new(store);
        let key = ReminderKey {
            book_id: 9,
            due_date: Utc::now(),
        };

        assert!(!notifier.has_unread_reminder(user.id, &key).await.unwrap());
        notifier
            .send(NewNotification::overdue_reminder(user.id, "Dune", key, 2))
            .await
            .unwrap();
        assert!(notifier.has_unread_reminder(user.id, &key).await.unwrap());

        let other_book = ReminderKey { book_id: 10, ..key };
        assert!(!notifier.has_unread_reminder(user.id, &other_book).await.unwrap());

        notifier.mark_all_read(user.id).await;
        assert!(!notifier.has_unread_reminder(user.id, &key).await.unwrap());
    }
}
