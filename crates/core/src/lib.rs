//! Pure domain logic for the pre-project service.
//!
//! Nothing in this crate touches the database or the network; the `db` and
//! `api` crates build on these types.

pub mod advisor_response;
pub mod error;
pub mod pre_project;
pub mod roles;
pub mod similarity;
pub mod types;
pub mod validation;
