//! Route definitions for the `/pre-projects` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::pre_project;
use crate::state::AppState;

/// Routes mounted at `/pre-projects`.
///
/// ```text
/// GET    /                       -> list
/// POST   /                       -> create
/// GET    /{id}                   -> get_by_id
/// PUT    /{id}                   -> update
/// DELETE /{id}                   -> delete
/// POST   /{id}/responses         -> respond
/// POST   /{id}/reset-advisors    -> reset_advisors
/// POST   /{id}/promote           -> promote
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(pre_project::list).post(pre_project::create))
        .route(
            "/{id}",
            get(pre_project::get_by_id)
                .put(pre_project::update)
                .delete(pre_project::delete),
        )
        .route("/{id}/responses", post(pre_project::respond))
        .route("/{id}/reset-advisors", post(pre_project::reset_advisors))
        .route("/{id}/promote", post(pre_project::promote))
}
