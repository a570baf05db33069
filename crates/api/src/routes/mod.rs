pub mod book;
pub mod health;
pub mod pre_project;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                                    WebSocket (token in query string)
///
/// /pre-projects                          list, create
/// /pre-projects/{id}                     get, update, delete
/// /pre-projects/{id}/responses           submit advisor response
/// /pre-projects/{id}/reset-advisors      reset responses (admin)
/// /pre-projects/{id}/promote             promote to book (admin)
///
/// /books/{id}                            get with snapshot sets
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/pre-projects", pre_project::router())
        .nest("/books", book::router())
}
