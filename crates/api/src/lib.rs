//! Capstone pre-project API server library.
//!
//! Exposes the building blocks (config, state, error handling, the lifecycle
//! coordinator, routes, WebSocket infrastructure) so integration tests and
//! the binary entrypoint can both access them.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod lifecycle;
pub mod middleware;
pub mod notifications;
pub mod query;
pub mod response;
pub mod router;
pub mod routes;
pub mod similarity;
pub mod state;
pub mod storage;
pub mod ws;
