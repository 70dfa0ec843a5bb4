//! Borrow record (loan) model and related types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::{IntoParams, ToSchema};

use crate::error::{AppError, AppResult};

/// Loan lifecycle: `Out --return--> Returned`, `Out --renew--> Out`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Out,
    Returned,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Out => "out",
            LoanStatus::Returned => "returned",
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "out" => Ok(LoanStatus::Out),
            "returned" => Ok(LoanStatus::Returned),
            _ => Err(format!("Invalid loan status: {}", s)),
        }
    }
}

// SQLx conversion for LoanStatus
impl sqlx::Type<Postgres> for LoanStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }
}

impl<'r> Decode<'r, Postgres> for LoanStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for LoanStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        let s: String = self.as_str().to_string();
        <String as Encode<Postgres>>::encode(s, buf)
    }
}

/// Loan model from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BorrowRecord {
    pub id: i32,
    pub book_id: i32,
    pub user_id: i32,
    pub begin_date: DateTime<Utc>,
    /// Date the book must be back; kept after return
    pub due_date: DateTime<Utc>,
    pub status: LoanStatus,
    pub renew_count: i32,
    pub returned_at: Option<DateTime<Utc>>,
}

impl BorrowRecord {
    pub fn is_out(&self) -> bool {
        self.status == LoanStatus::Out
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_out() && self.due_date < now
    }

    /// Actual end of the loan: the return instant once returned, the due date before
    pub fn end_date(&self) -> DateTime<Utc> {
        self.returned_at.unwrap_or(self.due_date)
    }

    /// Whole days elapsed since the due date, zero when not late
    pub fn overdue_days(&self, now: DateTime<Utc>) -> i64 {
        (now.date_naive() - self.due_date.date_naive()).num_days().max(0)
    }

    fn require_out(&self) -> AppResult<()> {
        match self.status {
            LoanStatus::Out => Ok(()),
            LoanStatus::Returned => Err(AppError::Conflict(format!(
                "Loan {} is already returned",
                self.id
            ))),
        }
    }

    pub fn mark_returned(&mut self, at: DateTime<Utc>) -> AppResult<()> {
        self.require_out()?;
        self.status = LoanStatus::Returned;
        self.returned_at = Some(at);
        Ok(())
    }

    /// Extend the loan from its current due date
    pub fn extend(&mut self, days: i64) -> AppResult<()> {
        self.require_out()?;
        self.due_date += Duration::days(days);
        self.renew_count += 1;
        Ok(())
    }
}

/// Values for a loan about to be inserted
#[derive(Debug, Clone)]
pub struct NewBorrowRecord {
    pub book_id: i32,
    pub user_id: i32,
    pub begin_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

/// Overdue loan joined with what a reminder needs to mention
#[derive(Debug, Clone, FromRow)]
pub struct OverdueLoan {
    #[sqlx(flatten)]
    pub record: BorrowRecord,
    pub title: String,
}

/// Loan list query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct LoanQuery {
    /// Filter by status (`out` or `returned`); all loans when absent
    pub status: Option<LoanStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(due: DateTime<Utc>) -> BorrowRecord {
        BorrowRecord {
            id: 1,
            book_id: 2,
            user_id: 3,
            begin_date: due - Duration::days(30),
            due_date: due,
            status: LoanStatus::Out,
            renew_count: 0,
            returned_at: None,
        }
    }

    #[test]
    fn test_extend_from_due_date() {
        let due = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut r = record(due);
        r.extend(30).unwrap();
        assert_eq!(r.due_date, Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap());
        assert_eq!(r.renew_count, 1);
        assert_eq!(r.status, LoanStatus::Out);
    }

    #[test]
    fn test_return_keeps_due_date() {
        let due = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let back = Utc.with_ymd_and_hms(2024, 3, 5, 9, 0, 0).unwrap();
        let mut r = record(due);
        r.mark_returned(back).unwrap();
        assert_eq!(r.status, LoanStatus::Returned);
        assert_eq!(r.due_date, due);
        assert_eq!(r.end_date(), back);
        assert!(!r.is_overdue(back));

        assert!(matches!(r.mark_returned(back), Err(AppError::Conflict(_))));
        assert!(matches!(r.extend(30), Err(AppError::Conflict(_))));
    }

    #[test]
    fn test_overdue_days() {
        let due = Utc.with_ymd_and_hms(2024, 3, 1, 23, 0, 0).unwrap();
        let r = record(due);
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 1, 0, 0).unwrap();
        assert!(r.is_overdue(now));
        assert_eq!(r.overdue_days(now), 3);
        assert_eq!(r.overdue_days(due - Duration::days(2)), 0);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("out".parse::<LoanStatus>(), Ok(LoanStatus::Out));
        assert_eq!("returned".parse::<LoanStatus>(), Ok(LoanStatus::Returned));
        assert!("OUT".parse::<LoanStatus>().is_err());
    }
}
