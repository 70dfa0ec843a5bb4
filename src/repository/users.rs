//! Users repository for database operations

use sqlx::{PgConnection, Pool, Postgres};

use crate::{error::AppResult, models::user::User};

const USER_COLUMNS: &str = "id, firstname, lastname, max_borrow, active_loan_count";

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Postgres>,
}

impl UsersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Lock a user row for the rest of the transaction
    pub async fn lock(conn: &mut PgConnection, id: i32) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1 FOR UPDATE",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(conn)
        .await?;
        Ok(user)
    }

    pub async fn update_loan_count(conn: &mut PgConnection, user: &User) -> AppResult<()> {
        sqlx::query("UPDATE users SET active_loan_count = $1 WHERE id = $2")
            .bind(user.active_loan_count)
            .bind(user.id)
            .execute(conn)
            .await?;
        Ok(())
    }
}
