//! Book entity model and DTOs.
//!
//! A book is the archived form of a pre-project. Its relation sets are
//! snapshots taken at promotion time.

use capstone_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

use crate::models::user::UserSummary;

/// A row from the `books` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Book {
    pub id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub file: Option<String>,
    pub year: i32,
    pub season: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for inserting a book together with its relation snapshots.
#[derive(Debug, Clone)]
pub struct CreateBook {
    pub name: String,
    pub description: Option<String>,
    pub file: Option<String>,
    pub year: i32,
    pub season: String,
    pub students: Vec<DbId>,
    pub advisors: Vec<DbId>,
    pub discussants: Vec<DbId>,
}

/// A book with its snapshot sets resolved to user summaries.
#[derive(Debug, Clone, Serialize)]
pub struct BookWithDetails {
    #[serde(flatten)]
    pub book: Book,
    pub students: Vec<UserSummary>,
    pub advisors: Vec<UserSummary>,
    pub discussants: Vec<UserSummary>,
}
