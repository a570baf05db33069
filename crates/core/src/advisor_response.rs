//! Advisor response state machine rules.
//!
//! Each (pre-project, advisor) pair moves `pending -> accepted` or
//! `pending -> rejected`; both end states are terminal until the whole
//! project is reset. The project holds at most one accepted advisor.
//!
//! The rules here are pure. The repository layer reads the current state
//! inside a transaction, asks [`check_transition`] whether the requested
//! status may be written, and performs the conditional claim that arbitrates
//! concurrent accepts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

/// Status ID type matching the SMALLINT `advisor_response_statuses.id`.
pub type StatusId = i16;

/// Status of one advisor's response to a solicitation.
///
/// Discriminants match the seed order of `advisor_response_statuses`.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvisorStatus {
    Pending = 1,
    Accepted = 2,
    Rejected = 3,
}

impl AdvisorStatus {
    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(AdvisorStatus::Pending),
            2 => Some(AdvisorStatus::Accepted),
            3 => Some(AdvisorStatus::Rejected),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AdvisorStatus::Pending => "pending",
            AdvisorStatus::Accepted => "accepted",
            AdvisorStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, AdvisorStatus::Pending)
    }
}

impl fmt::Display for AdvisorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdvisorStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(AdvisorStatus::Pending),
            "accepted" => Ok(AdvisorStatus::Accepted),
            "rejected" => Ok(AdvisorStatus::Rejected),
            _ => Err(CoreError::field(
                "status",
                "Invalid status. Must be 'pending', 'accepted', or 'rejected'",
            )),
        }
    }
}

/// Snapshot of the state a response decision is made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseState {
    /// The project's accepted advisor slot.
    pub accepted_advisor: Option<DbId>,
    /// The responding advisor's current row, `None` if they were never solicited.
    pub current: Option<AdvisorStatus>,
}

/// Why a response was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionError {
    /// The advisor has no response row for this project.
    NotSolicited,
    /// This advisor already holds the accepted slot.
    AlreadyAccepted,
    /// A different advisor holds (or just won) the accepted slot.
    AcceptedByAnother,
    /// The advisor's response is terminal and cannot move to the requested status.
    AlreadyResponded { current: AdvisorStatus },
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionError::NotSolicited => {
                f.write_str("The advisor is not assigned to this pre-project")
            }
            TransitionError::AlreadyAccepted => {
                f.write_str("You have already accepted this pre-project")
            }
            TransitionError::AcceptedByAnother => {
                f.write_str("Pre-project has already been accepted by another advisor")
            }
            TransitionError::AlreadyResponded { current } => {
                write!(f, "Response is already {current} and can no longer change")
            }
        }
    }
}

impl From<TransitionError> for CoreError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::NotSolicited => CoreError::field("advisor", err.to_string()),
            _ => CoreError::Conflict(err.to_string()),
        }
    }
}

/// Decide whether `advisor` may record `requested` given `state`.
///
/// Order matters: a repeat accept by the winner is reported as
/// [`TransitionError::AlreadyAccepted`] whatever else holds.
pub fn check_transition(
    state: ResponseState,
    advisor: DbId,
    requested: AdvisorStatus,
) -> Result<(), TransitionError> {
    if state.accepted_advisor == Some(advisor) {
        return Err(TransitionError::AlreadyAccepted);
    }

    let Some(current) = state.current else {
        return Err(TransitionError::NotSolicited);
    };

    if requested == AdvisorStatus::Accepted && state.accepted_advisor.is_some() {
        return Err(TransitionError::AcceptedByAnother);
    }

    if current.is_terminal() && current != requested {
        return Err(TransitionError::AlreadyResponded { current });
    }

    Ok(())
}
