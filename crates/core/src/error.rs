use crate::similarity::SimilarProject;
use crate::types::DbId;
use crate::validation::FieldErrors;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// One or more fields failed validation. Never partially applied.
    #[error("Validation failed on {} field(s)", .0.len())]
    InvalidFields(FieldErrors),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The similarity service found existing projects scoring above the
    /// blocking threshold.
    #[error("Project is too similar to {} existing project(s)", .0.len())]
    TooSimilar(Vec<SimilarProject>),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A collaborator (identity directory, file storage, scoring service) failed.
    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a single-field validation failure.
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.add(field, message);
        CoreError::InvalidFields(errors)
    }
}
