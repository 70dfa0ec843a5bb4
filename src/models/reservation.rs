//! Reservation model and its state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::error::{AppError, AppResult};

/// Reservation lifecycle.
///
/// ```text
/// Pending --promote--> Ready --convert--> Completed
///    |                   |---sweep-----> Expired
///    |                   `---cancel----> Cancelled
///    `------cancel-------------------->  Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Ready,
    Cancelled,
    Expired,
    Completed,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Ready => "ready",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Expired => "expired",
            ReservationStatus::Completed => "completed",
        }
    }

    /// Pending and Ready are the only non-terminal states
    pub fn is_active(&self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Ready)
    }

    pub fn can_become(&self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;
        matches!(
            (self, next),
            (Pending, Ready)
                | (Pending, Cancelled)
                | (Ready, Cancelled)
                | (Ready, Completed)
                | (Ready, Expired)
        )
    }

    /// Position in user-facing listings: pending group, ready group, then history
    pub fn listing_rank(&self) -> u8 {
        match self {
            ReservationStatus::Pending => 0,
            ReservationStatus::Ready => 1,
            _ => 2,
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReservationStatus::Pending),
            "ready" => Ok(ReservationStatus::Ready),
            "cancelled" => Ok(ReservationStatus::Cancelled),
            "expired" => Ok(ReservationStatus::Expired),
            "completed" => Ok(ReservationStatus::Completed),
            _ => Err(format!("Invalid reservation status: {}", s)),
        }
    }
}

// SQLx conversion for ReservationStatus
impl sqlx::Type<Postgres> for ReservationStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for ReservationStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for ReservationStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        let s: String = self.as_str().to_string();
        <String as Encode<Postgres>>::encode(s, buf)
    }
}

/// Reservation model from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Reservation {
    pub id: i32,
    pub book_id: i32,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
    pub status: ReservationStatus,
    /// When the reservation was promoted to Ready
    pub ready_at: Option<DateTime<Utc>>,
    /// When the reservation reached a terminal state
    pub closed_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    /// Loan created by the conversion
    pub loan_id: Option<i32>,
}

impl Reservation {
    fn transition(&mut self, next: ReservationStatus) -> AppResult<()> {
        if !self.status.can_become(next) {
            return Err(AppError::Conflict(format!(
                "Reservation {} cannot go from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    pub fn promote(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        self.transition(ReservationStatus::Ready)?;
        self.ready_at = Some(now);
        Ok(())
    }

    pub fn cancel(&mut self, reason: Option<String>, now: DateTime<Utc>) -> AppResult<()> {
        self.transition(ReservationStatus::Cancelled)?;
        self.cancel_reason = reason;
        self.closed_at = Some(now);
        Ok(())
    }

    pub fn complete(&mut self, loan_id: i32, now: DateTime<Utc>) -> AppResult<()> {
        self.transition(ReservationStatus::Completed)?;
        self.loan_id = Some(loan_id);
        self.closed_at = Some(now);
        Ok(())
    }

    pub fn expire(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        self.transition(ReservationStatus::Expired)?;
        self.closed_at = Some(now);
        Ok(())
    }

    /// Start of the hold window: promotion instant, creation for rows promoted
    /// before `ready_at` was tracked
    pub fn held_since(&self) -> DateTime<Utc> {
        self.ready_at.unwrap_or(self.created_at)
    }

    /// FIFO key used by promotion
    pub fn queue_key(&self) -> (DateTime<Utc>, i32) {
        (self.created_at, self.id)
    }
}

/// Values for a reservation about to be inserted
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub book_id: i32,
    pub user_id: i32,
    pub created_at: DateTime<Utc>,
}

/// Reservation list query parameters
#[derive(Debug, Deserialize, Validate, IntoParams, ToSchema)]
pub struct ReservationQuery {
    /// Filter by status
    pub status: Option<ReservationStatus>,
    /// Page number (1-based)
    #[validate(range(min = 1, max = 1_000_000))]
    pub page: Option<i64>,
    /// Items per page
    #[validate(range(min = 1, max = 100))]
    pub per_page: Option<i64>,
}

impl Default for ReservationQuery {
    fn default() -> Self {
        Self {
            status: None,
            page: Some(1),
            per_page: Some(20),
        }
    }
}

impl ReservationQuery {
    pub fn limit(&self) -> i64 {
        self.per_page.unwrap_or(20)
    }

    pub fn offset(&self) -> i64 {
        self.page
            .unwrap_or(1)
            .saturating_sub(1)
            .saturating_mul(self.limit())
    }
}

/// Paginated reservation list
#[derive(Debug, Serialize, ToSchema)]
pub struct ReservationPage {
    pub items: Vec<Reservation>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reservation(status: ReservationStatus) -> Reservation {
        Reservation {
            id: 4,
            book_id: 1,
            user_id: 2,
            created_at: Utc::now() - Duration::days(1),
            status,
            ready_at: None,
            closed_at: None,
            cancel_reason: None,
            loan_id: None,
        }
    }

    #[test]
    fn test_transition_table() {
        use ReservationStatus::*;
        let all = [Pending, Ready, Cancelled, Expired, Completed];
        for from in all {
            for to in all {
                let allowed = from.can_become(to);
                let expected = matches!(
                    (from, to),
                    (Pending, Ready)
                        | (Pending, Cancelled)
                        | (Ready, Cancelled)
                        | (Ready, Completed)
                        | (Ready, Expired)
                );
                assert_eq!(allowed, expected, "{} -> {}", from, to);
            }
        }
        assert!(Pending.is_active() && Ready.is_active());
        assert!(!Cancelled.is_active() && !Expired.is_active() && !Completed.is_active());
    }

    #[test]
    fn test_promote_then_complete() {
        let now = Utc::now();
        let mut r = reservation(ReservationStatus::Pending);
        r.promote(now).unwrap();
        assert_eq!(r.status, ReservationStatus::Ready);
        assert_eq!(r.held_since(), now);
        r.complete(11, now).unwrap();
        assert_eq!(r.status, ReservationStatus::Completed);
        assert_eq!(r.loan_id, Some(11));
        assert!(r.closed_at.is_some());
    }

    #[test]
    fn test_pending_cannot_complete_or_expire() {
        let now = Utc::now();
        let mut r = reservation(ReservationStatus::Pending);
        assert!(matches!(r.complete(1, now), Err(AppError::Conflict(_))));
        assert!(matches!(r.expire(now), Err(AppError::Conflict(_))));
        assert_eq!(r.status, ReservationStatus::Pending);
    }

    #[test]
    fn test_terminal_states_stay_terminal() {
        let now = Utc::now();
        let mut r = reservation(ReservationStatus::Expired);
        assert!(r.cancel(None, now).is_err());
        assert!(r.promote(now).is_err());
        assert_eq!(r.status, ReservationStatus::Expired);
    }

    #[test]
    fn test_query_paging() {
        let q = ReservationQuery {
            status: None,
            page: Some(3),
            per_page: Some(10),
        };
        assert_eq!(q.limit(), 10);
        assert_eq!(q.offset(), 20);
        assert!(q.validate().is_ok());

        let bad = ReservationQuery {
            status: None,
            page: Some(0),
            per_page: Some(500),
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_query_huge_page() {
        let huge = ReservationQuery {
            status: None,
            page: Some(i64::MAX),
            per_page: Some(100),
        };
        assert!(huge.validate().is_err());
        assert_eq!(huge.offset(), i64::MAX);

        let negative = ReservationQuery {
            page: Some(i64::MIN),
            ..huge
        };
        assert!(negative.validate().is_err());
        assert_eq!(negative.offset(), i64::MIN);

        let last = ReservationQuery {
            status: None,
            page: Some(1_000_000),
            per_page: Some(100),
        };
        assert!(last.validate().is_ok());
        assert_eq!(last.offset(), 99_999_900);
    }
}
