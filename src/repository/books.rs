//! Books repository for database operations

use sqlx::{PgConnection, Pool, Postgres};

use crate::{error::AppResult, models::book::Book};

#[derive(Clone)]
pub struct BooksRepository {
    pool: Pool<Postgres>,
}

impl BooksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get book by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(
            "SELECT id, title, author, total, available, times FROM books WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(book)
    }

    /// Lock a book row for the rest of the transaction
    pub async fn lock(conn: &mut PgConnection, id: i32) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(
            "SELECT id, title, author, total, available, times FROM books WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;
        Ok(book)
    }

    pub async fn update_stock(conn: &mut PgConnection, book: &Book) -> AppResult<()> {
        sqlx::query("UPDATE books SET available = $1, times = $2 WHERE id = $3")
            .bind(book.available)
            .bind(book.times)
            .bind(book.id)
            .execute(conn)
            .await?;
        Ok(())
    }
}
