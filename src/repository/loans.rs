//! Borrow records repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::loan::{BorrowRecord, LoanStatus, NewBorrowRecord, OverdueLoan},
};

const LOAN_COLUMNS: &str =
    "id, book_id, user_id, begin_date, due_date, status, renew_count, returned_at";

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get loan by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Option<BorrowRecord>> {
        let loan = sqlx::query_as::<_, BorrowRecord>(&format!(
            "SELECT {} FROM borrow_records WHERE id = $1",
            LOAN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(loan)
    }

    /// Get loans for a user
    pub async fn get_user_loans(
        &self,
        user_id: i32,
        status: Option<LoanStatus>,
    ) -> AppResult<Vec<BorrowRecord>> {
        let loans = sqlx::query_as::<_, BorrowRecord>(&format!(
            r#"
            SELECT {} FROM borrow_records
            WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
            ORDER BY begin_date DESC, id DESC
            "#,
            LOAN_COLUMNS
        ))
        .bind(user_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }

    /// Out loans past their due date, with the book title for reminders
    pub async fn get_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<OverdueLoan>> {
        let loans = sqlx::query_as::<_, OverdueLoan>(
            r#"
            SELECT l.id, l.book_id, l.user_id, l.begin_date, l.due_date, l.status,
                   l.renew_count, l.returned_at, b.title
            FROM borrow_records l
            JOIN books b ON b.id = l.book_id
            WHERE l.status = 'out' AND l.due_date < $1
            ORDER BY l.due_date, l.id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }

    /// Count active loans
    pub async fn count_active(&self) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM borrow_records WHERE status = 'out'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Count overdue loans
    pub async fn count_overdue(&self, now: DateTime<Utc>) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrow_records WHERE status = 'out' AND due_date < $1",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Lock a loan row for the rest of the transaction
    pub async fn lock(conn: &mut PgConnection, id: i32) -> AppResult<Option<BorrowRecord>> {
        let loan = sqlx::query_as::<_, BorrowRecord>(&format!(
            "SELECT {} FROM borrow_records WHERE id = $1 FOR UPDATE",
            LOAN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(conn)
        .await?;
        Ok(loan)
    }

    /// Create a new loan
    pub async fn insert(conn: &mut PgConnection, loan: &NewBorrowRecord) -> AppResult<BorrowRecord> {
        let record = sqlx::query_as::<_, BorrowRecord>(&format!(
            r#"
            INSERT INTO borrow_records (book_id, user_id, begin_date, due_date, status, renew_count)
            VALUES ($1, $2, $3, $4, $5, 0)
            RETURNING {}
            "#,
            LOAN_COLUMNS
        ))
        .bind(loan.book_id)
        .bind(loan.user_id)
        .bind(loan.begin_date)
        .bind(loan.due_date)
        .bind(LoanStatus::Out)
        .fetch_one(conn)
        .await?;
        Ok(record)
    }

    pub async fn update(conn: &mut PgConnection, loan: &BorrowRecord) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE borrow_records
            SET status = $1, due_date = $2, renew_count = $3, returned_at = $4
            WHERE id = $5
            "#,
        )
        .bind(loan.status)
        .bind(loan.due_date)
        .bind(loan.renew_count)
        .bind(loan.returned_at)
        .bind(loan.id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Loan with id {} not found", loan.id)));
        }
        Ok(())
    }

    pub async fn count_open_for_title(
        conn: &mut PgConnection,
        user_id: i32,
        book_id: i32,
    ) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM borrow_records WHERE user_id = $1 AND book_id = $2 AND status = 'out'",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(conn)
        .await?;
        Ok(count)
    }

    pub async fn has_overdue(
        conn: &mut PgConnection,
        user_id: i32,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM borrow_records WHERE user_id = $1 AND status = 'out' AND due_date < $2)",
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(conn)
        .await?;
        Ok(exists)
    }
}
