//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - `Deserialize`/plain DTOs for inserts and updates

pub mod advisor_response;
pub mod book;
pub mod pre_project;
pub mod user;
