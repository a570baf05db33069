//! Route definitions for the `/books` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::book;
use crate::state::AppState;

/// Routes mounted at `/books`.
///
/// ```text
/// GET    /{id}                   -> get_by_id
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/{id}", get(book::get_by_id))
}
