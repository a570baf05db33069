//! Handlers for the `/pre-projects` resource.
//!
//! Create and update take `multipart/form-data` so a proposal file can ride
//! along. Person lists arrive as comma-separated email strings.

use std::collections::HashMap;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use capstone_core::error::CoreError;
use capstone_core::pre_project::split_email_list;
use capstone_core::types::DbId;
use capstone_db::models::advisor_response::AdvisorResponse;
use capstone_db::models::book::BookWithDetails;
use capstone_db::models::pre_project::{PreProject, PreProjectAggregate};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::lifecycle::{NewPreProject, PreProjectPatch, Upload};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireAdmin;
use crate::query::{
    clamp_limit, clamp_offset, PaginationParams, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT,
};
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for POST /api/v1/pre-projects/{id}/responses.
#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub status: String,
}

/// Raw multipart form: text fields by name plus at most one upload.
#[derive(Debug, Default)]
struct PreProjectForm {
    fields: HashMap<String, String>,
    file: Option<Upload>,
}

impl PreProjectForm {
    async fn read(mut multipart: Multipart) -> AppResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?
        {
            let name = field.name().unwrap_or("").to_string();
            if name == "file" {
                let file_name = field.file_name().unwrap_or("").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                // Browsers send an empty part when no file was chosen.
                if !file_name.is_empty() && !data.is_empty() {
                    form.file = Some(Upload {
                        file_name,
                        data: data.to_vec(),
                    });
                }
            } else if !name.is_empty() {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                form.fields.insert(name, text.trim().to_string());
            }
        }

        Ok(form)
    }

    fn take(&mut self, key: &str) -> Option<String> {
        self.fields.remove(key)
    }

    fn take_emails(&mut self, key: &str) -> Option<Vec<String>> {
        self.take(key).map(|raw| split_email_list(&raw))
    }

    fn take_year(&mut self) -> AppResult<Option<i32>> {
        self.take("year")
            .map(|raw| {
                raw.parse::<i32>().map_err(|_| {
                    AppError::from(CoreError::field("year", "Project year must be a number"))
                })
            })
            .transpose()
    }

    fn into_new(mut self) -> AppResult<NewPreProject> {
        Ok(NewPreProject {
            name: self.take("name").unwrap_or_default(),
            description: self.take("description"),
            file_description: self.take("file_description"),
            year: self.take_year()?.unwrap_or_default(),
            season: self.take("season").unwrap_or_default(),
            students: self.take_emails("students").unwrap_or_default(),
            advisors: self.take_emails("advisors").unwrap_or_default(),
            file: self.file,
        })
    }

    fn into_patch(mut self) -> AppResult<PreProjectPatch> {
        let degree = match self.take("degree") {
            None => None,
            Some(raw) if raw.is_empty() => Some(None),
            Some(raw) => Some(Some(raw.parse::<i32>().map_err(|_| {
                AppError::from(CoreError::field("degree", "Project degree must be a number"))
            })?)),
        };
        let can_update = self
            .take("can_update")
            .map(|raw| match raw.as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" => Ok(false),
                _ => Err(AppError::from(CoreError::field(
                    "can_update",
                    "can_update must be true or false",
                ))),
            })
            .transpose()?;

        Ok(PreProjectPatch {
            name: self.take("name"),
            description: self.take("description").map(Some),
            file_description: self.take("file_description").map(Some),
            year: self.take_year()?,
            season: self.take("season"),
            degree,
            can_update,
            students: self.take_emails("students"),
            advisors: self.take_emails("advisors"),
            discussants: self.take_emails("discussants"),
            file: self.file,
        })
    }
}

/// GET /api/v1/pre-projects
pub async fn list(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<DataResponse<Vec<PreProject>>>> {
    let limit = clamp_limit(params.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT);
    let offset = clamp_offset(params.offset);
    let projects = state.lifecycle.list(limit, offset).await?;
    Ok(Json(DataResponse { data: projects }))
}

/// POST /api/v1/pre-projects
///
/// The authenticated user becomes the owner and is always one of the students.
pub async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<PreProjectAggregate>>)> {
    let input = PreProjectForm::read(multipart).await?.into_new()?;
    let aggregate = state.lifecycle.create(&user, input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: aggregate })))
}

/// GET /api/v1/pre-projects/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<PreProjectAggregate>>> {
    let aggregate = state.lifecycle.get(id).await?;
    Ok(Json(DataResponse { data: aggregate }))
}

/// PUT /api/v1/pre-projects/{id}
///
/// Fields left out of the form keep their current value.
pub async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
    multipart: Multipart,
) -> AppResult<Json<DataResponse<PreProjectAggregate>>> {
    let patch = PreProjectForm::read(multipart).await?.into_patch()?;
    let aggregate = state.lifecycle.update(&user, id, patch).await?;
    Ok(Json(DataResponse { data: aggregate }))
}

/// DELETE /api/v1/pre-projects/{id}
pub async fn delete(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    state.lifecycle.delete(&user, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/pre-projects/{id}/responses
pub async fn respond(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<DbId>,
    Json(input): Json<RespondRequest>,
) -> AppResult<Json<DataResponse<AdvisorResponse>>> {
    let response = state.lifecycle.respond(&user, id, &input.status).await?;
    Ok(Json(DataResponse { data: response }))
}

/// POST /api/v1/pre-projects/{id}/reset-advisors
pub async fn reset_advisors(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<PreProjectAggregate>>> {
    let aggregate = state.lifecycle.reset(id).await?;
    Ok(Json(DataResponse { data: aggregate }))
}

/// POST /api/v1/pre-projects/{id}/promote
pub async fn promote(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(id): Path<DbId>,
) -> AppResult<(StatusCode, Json<DataResponse<BookWithDetails>>)> {
    let book = state.lifecycle.promote(id).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: book })))
}
