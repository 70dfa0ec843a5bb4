//! Reservations repository for database operations

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult, Policy},
    models::reservation::{NewReservation, Reservation, ReservationQuery, ReservationStatus},
};

const RESERVATION_COLUMNS: &str =
    "id, book_id, user_id, created_at, status, ready_at, closed_at, cancel_reason, loan_id";

#[derive(Clone)]
pub struct ReservationsRepository {
    pool: Pool<Postgres>,
}

impl ReservationsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get reservation by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Option<Reservation>> {
        let reservation = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM reservations WHERE id = $1",
            RESERVATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(reservation)
    }

    /// List reservations of a user with optional status filter and pagination
    pub async fn list_for_user(
        &self,
        user_id: i32,
        query: &ReservationQuery,
    ) -> AppResult<(Vec<Reservation>, i64)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reservations WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)",
        )
        .bind(user_id)
        .bind(query.status)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, Reservation>(&format!(
            r#"
            SELECT {} FROM reservations
            WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
            ORDER BY
                CASE status WHEN 'pending' THEN 0 WHEN 'ready' THEN 1 ELSE 2 END,
                CASE WHEN status IN ('pending', 'ready') THEN created_at END ASC,
                created_at DESC,
                id
            LIMIT $3 OFFSET $4
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(user_id)
        .bind(query.status)
        .bind(query.limit())
        .bind(query.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((rows, total))
    }

    /// Active queue of a book
    pub async fn list_queue(&self, book_id: i32) -> AppResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, Reservation>(&format!(
            r#"
            SELECT {} FROM reservations
            WHERE book_id = $1 AND status IN ('pending', 'ready')
            ORDER BY CASE status WHEN 'pending' THEN 0 ELSE 1 END, created_at, id
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Ready reservations held since before the cutoff
    pub async fn get_stale_ready(&self, held_before: DateTime<Utc>) -> AppResult<Vec<Reservation>> {
        let rows = sqlx::query_as::<_, Reservation>(&format!(
            r#"
            SELECT {} FROM reservations
            WHERE status = 'ready' AND COALESCE(ready_at, created_at) < $1
            ORDER BY COALESCE(ready_at, created_at), id
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(held_before)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Lock a reservation row for the rest of the transaction
    pub async fn lock(conn: &mut PgConnection, id: i32) -> AppResult<Option<Reservation>> {
        let reservation = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM reservations WHERE id = $1 FOR UPDATE",
            RESERVATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(conn)
        .await?;
        Ok(reservation)
    }

    pub async fn has_active(conn: &mut PgConnection, book_id: i32, user_id: i32) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM reservations
                WHERE book_id = $1 AND user_id = $2 AND status IN ('pending', 'ready')
            )
            "#,
        )
        .bind(book_id)
        .bind(user_id)
        .fetch_one(conn)
        .await?;
        Ok(exists)
    }

    pub async fn get_ready(conn: &mut PgConnection, book_id: i32) -> AppResult<Option<Reservation>> {
        let reservation = sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {} FROM reservations WHERE book_id = $1 AND status = 'ready' FOR UPDATE",
            RESERVATION_COLUMNS
        ))
        .bind(book_id)
        .fetch_optional(conn)
        .await?;
        Ok(reservation)
    }

    pub async fn lock_oldest_pending(
        conn: &mut PgConnection,
        book_id: i32,
    ) -> AppResult<Option<Reservation>> {
        let reservation = sqlx::query_as::<_, Reservation>(&format!(
            r#"
            SELECT {} FROM reservations
            WHERE book_id = $1 AND status = 'pending'
            ORDER BY created_at, id
            LIMIT 1
            FOR UPDATE
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(book_id)
        .fetch_optional(conn)
        .await?;
        Ok(reservation)
    }

    /// Create a pending reservation
    pub async fn insert(
        conn: &mut PgConnection,
        reservation: &NewReservation,
    ) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>(&format!(
            r#"
            INSERT INTO reservations (book_id, user_id, created_at, status)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            RESERVATION_COLUMNS
        ))
        .bind(reservation.book_id)
        .bind(reservation.user_id)
        .bind(reservation.created_at)
        .bind(ReservationStatus::Pending)
        .fetch_one(conn)
        .await
        .map_err(|e| match e {
            // reservations_one_active_per_user
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::PolicyViolation(Policy::AlreadyReserved)
            }
            e => AppError::Database(e),
        })
    }

    pub async fn update(conn: &mut PgConnection, reservation: &Reservation) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE reservations
            SET status = $1, ready_at = $2, closed_at = $3, cancel_reason = $4, loan_id = $5
            WHERE id = $6
            "#,
        )
        .bind(reservation.status)
        .bind(reservation.ready_at)
        .bind(reservation.closed_at)
        .bind(&reservation.cancel_reason)
        .bind(reservation.loan_id)
        .bind(reservation.id)
        .execute(conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Reservation with id {} not found",
                reservation.id
            )));
        }
        Ok(())
    }
}
