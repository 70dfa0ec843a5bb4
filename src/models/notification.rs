//! Notification requests handed to the notification collaborator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type NotificationId = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    ReservationReady,
    ReservationExpired,
    OverdueReminder,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::ReservationReady => "reservation_ready",
            NotificationCategory::ReservationExpired => "reservation_expired",
            NotificationCategory::OverdueReminder => "overdue_reminder",
        }
    }
}

/// Identifies the loan an overdue reminder is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReminderKey {
    pub book_id: i32,
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub receiver_id: i32,
    pub title: String,
    pub content: String,
    pub category: NotificationCategory,
    pub reference: Option<ReminderKey>,
}

impl NewNotification {
    pub fn reservation_ready(receiver_id: i32, book_title: &str, grace_days: i64) -> Self {
        Self {
            receiver_id,
            title: "Reservation ready".to_string(),
            content: format!(
                "A copy of \"{}\" is being held for you. Please collect it within {} days.",
                book_title, grace_days
            ),
            category: NotificationCategory::ReservationReady,
            reference: None,
        }
    }

    pub fn reservation_expired(receiver_id: i32, book_title: &str) -> Self {
        Self {
            receiver_id,
            title: "Reservation expired".to_string(),
            content: format!(
                "Your reservation for \"{}\" expired because it was not collected in time.",
                book_title
            ),
            category: NotificationCategory::ReservationExpired,
            reference: None,
        }
    }

    pub fn overdue_reminder(
        receiver_id: i32,
        book_title: &str,
        key: ReminderKey,
        overdue_days: i64,
    ) -> Self {
        Self {
            receiver_id,
            title: "Overdue loan".to_string(),
            content: format!(
                "\"{}\" was due on {} and is {} day(s) overdue. Please return it.",
                book_title,
                key.due_date.format("%Y-%m-%d"),
                overdue_days
            ),
            category: NotificationCategory::OverdueReminder,
            reference: Some(key),
        }
    }
}
