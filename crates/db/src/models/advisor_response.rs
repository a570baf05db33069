//! Advisor response entity model and the submit outcome.

use capstone_core::advisor_response::{AdvisorStatus, StatusId, TransitionError};
use capstone_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `advisor_responses` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct AdvisorResponse {
    pub id: DbId,
    pub pre_project_id: DbId,
    pub advisor_id: DbId,
    pub status_id: StatusId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl AdvisorResponse {
    /// Decoded status; unknown ids read as pending.
    pub fn status(&self) -> AdvisorStatus {
        AdvisorStatus::from_id(self.status_id).unwrap_or(AdvisorStatus::Pending)
    }
}

/// Result of [`AdvisorResponseRepo::submit`](crate::repositories::AdvisorResponseRepo::submit).
///
/// Refusals are values, not errors: the transaction was rolled back and
/// nothing changed.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// A pending or rejected response was written.
    Recorded(AdvisorResponse),
    /// The advisor claimed the accepted slot; sibling responses are now rejected.
    Accepted(AdvisorResponse),
    ProjectNotFound,
    Refused(TransitionError),
}
