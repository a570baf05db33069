//! Request handlers.
//!
//! Handlers extract the caller and request input, delegate to the
//! [`PreProjectLifecycle`](crate::lifecycle::PreProjectLifecycle) held in
//! state, and map errors via [`AppError`](crate::error::AppError).

pub mod book;
pub mod pre_project;
