//! Handlers for the `/books` resource.

use axum::extract::{Path, State};
use axum::Json;
use capstone_core::types::DbId;
use capstone_db::models::book::BookWithDetails;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/books/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<BookWithDetails>>> {
    let book = state.lifecycle.get_book(id).await?;
    Ok(Json(DataResponse { data: book }))
}
