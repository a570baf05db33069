//! Repository for the `books` table and its snapshot relations.

use capstone_core::types::DbId;
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::book::{Book, BookWithDetails, CreateBook};
use crate::models::user::UserSummary;

/// Column list for the `books` table.
const COLUMNS: &str = "id, name, description, file, year, season, created_at, updated_at";

/// Provides persistence for books.
pub struct BookRepo;

impl BookRepo {
    /// Insert a book and its student, advisor and discussant snapshots.
    ///
    /// Runs inside the caller's transaction so promotion can delete the
    /// source pre-project in the same unit of work.
    pub async fn create(
        tx: &mut Transaction<'_, Postgres>,
        input: &CreateBook,
    ) -> Result<Book, sqlx::Error> {
        let query = format!(
            "INSERT INTO books (name, description, file, year, season) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        let book = sqlx::query_as::<_, Book>(&query)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.file)
            .bind(input.year)
            .bind(&input.season)
            .fetch_one(&mut **tx)
            .await?;

        Self::insert_members(tx, "book_students", "student_id", book.id, &input.students).await?;
        Self::insert_members(tx, "book_advisors", "advisor_id", book.id, &input.advisors).await?;
        Self::insert_members(
            tx,
            "book_discussants",
            "discussant_id",
            book.id,
            &input.discussants,
        )
        .await?;

        Ok(book)
    }

    /// Find a book row by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Book>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM books WHERE id = $1");
        sqlx::query_as::<_, Book>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a book by ID, enriched with its snapshot sets.
    pub async fn find_with_details(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<BookWithDetails>, sqlx::Error> {
        let Some(book) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };

        let students = Self::members(pool, "book_students", "student_id", id).await?;
        let advisors = Self::members(pool, "book_advisors", "advisor_id", id).await?;
        let discussants = Self::members(pool, "book_discussants", "discussant_id", id).await?;

        Ok(Some(BookWithDetails {
            book,
            students,
            advisors,
            discussants,
        }))
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    async fn insert_members(
        tx: &mut Transaction<'_, Postgres>,
        table: &str,
        column: &str,
        book_id: DbId,
        user_ids: &[DbId],
    ) -> Result<(), sqlx::Error> {
        let query = format!(
            "INSERT INTO {table} (book_id, {column}) VALUES ($1, $2) ON CONFLICT DO NOTHING"
        );
        for &user_id in user_ids {
            sqlx::query(&query)
                .bind(book_id)
                .bind(user_id)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    async fn members(
        pool: &PgPool,
        table: &str,
        column: &str,
        book_id: DbId,
    ) -> Result<Vec<UserSummary>, sqlx::Error> {
        let query = format!(
            "SELECT u.id, u.name, u.email \
             FROM users u \
             JOIN {table} m ON m.{column} = u.id \
             WHERE m.book_id = $1 \
             ORDER BY u.name, u.id"
        );
        sqlx::query_as::<_, UserSummary>(&query)
            .bind(book_id)
            .fetch_all(pool)
            .await
    }
}
