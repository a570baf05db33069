//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that take
//! `&PgPool` (or an open transaction when the caller composes several steps
//! into one unit of work).

pub mod advisor_response_repo;
pub mod book_repo;
pub mod pre_project_repo;
pub mod user_repo;

pub use advisor_response_repo::AdvisorResponseRepo;
pub use book_repo::BookRepo;
pub use pre_project_repo::PreProjectRepo;
pub use user_repo::UserRepo;
