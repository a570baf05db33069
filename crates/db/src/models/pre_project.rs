//! Pre-project entity model, DTOs, and the joined-row aggregate decoder.
//!
//! A pre-project read for display is one left-join fan-out over its advisor
//! responses, students, discussants and accepted advisor. Every row repeats
//! the project's scalar columns and carries at most one detail per relation;
//! [`PreProjectAggregate::from_rows`] folds that stream back into one value
//! with each related entity listed once.

use std::collections::HashSet;

use capstone_core::advisor_response::{AdvisorStatus, StatusId};
use capstone_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `pre_projects` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct PreProject {
    pub id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub file: Option<String>,
    pub file_description: Option<String>,
    pub project_owner: DbId,
    pub accepted_advisor: Option<DbId>,
    pub year: i32,
    pub season: String,
    pub can_update: bool,
    pub degree: Option<i32>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for inserting a new pre-project. `can_update` always starts true.
#[derive(Debug, Clone)]
pub struct CreatePreProject {
    pub name: String,
    pub description: Option<String>,
    pub file: Option<String>,
    pub file_description: Option<String>,
    pub project_owner: DbId,
    pub year: i32,
    pub season: String,
}

/// Fully merged scalar values written by an update.
///
/// Not a patch: the caller has already merged the request onto the current
/// row, so every column is written as-is and `None` clears a nullable column.
#[derive(Debug, Clone)]
pub struct PreProjectChanges {
    pub name: String,
    pub description: Option<String>,
    pub file: Option<String>,
    pub file_description: Option<String>,
    pub year: i32,
    pub season: String,
    pub can_update: bool,
    pub degree: Option<i32>,
}

/// Replacement relation sets applied by an update. `None` leaves a set alone;
/// `Some(vec![])` empties it.
#[derive(Debug, Clone, Default)]
pub struct RelationChanges {
    pub students: Option<Vec<DbId>>,
    /// A new advisor set re-solicits: responses are replaced by pending rows
    /// and the accepted advisor is cleared.
    pub advisors: Option<Vec<DbId>>,
    pub discussants: Option<Vec<DbId>>,
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// One solicited advisor and their response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdvisorResponseDetails {
    pub advisor_id: DbId,
    pub advisor_name: String,
    pub advisor_email: String,
    pub status: AdvisorStatus,
    pub created_at: Option<Timestamp>,
    pub updated_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentDetails {
    pub student_id: DbId,
    pub student_name: String,
    pub student_email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscussantDetails {
    pub discussant_id: DbId,
    pub discussant_name: String,
    pub discussant_email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdvisorInfo {
    pub id: DbId,
    pub name: String,
    pub email: String,
}

/// A pre-project with its related entities, as returned to readers.
///
/// List order is the order ids were first seen in the row stream, which the
/// query does not pin down. Sort before comparing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreProjectAggregate {
    pub pre_project: PreProject,
    pub advisors: Vec<AdvisorResponseDetails>,
    pub students: Vec<StudentDetails>,
    pub discussants: Vec<DiscussantDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_advisor_info: Option<AdvisorInfo>,
}

impl PreProjectAggregate {
    /// Fold a joined row stream into one aggregate.
    ///
    /// Returns `None` when the stream is empty (the project does not exist).
    pub fn from_rows<I>(rows: I) -> Option<Self>
    where
        I: IntoIterator<Item = PreProjectJoinRow>,
    {
        rows.into_iter()
            .fold(None::<AggregateFold>, |acc, row| {
                let mut fold = acc.unwrap_or_else(|| AggregateFold::new(row.project.clone()));
                fold.absorb(row);
                Some(fold)
            })
            .map(AggregateFold::finish)
    }

    pub fn advisor_ids(&self) -> Vec<DbId> {
        self.advisors.iter().map(|a| a.advisor_id).collect()
    }

    pub fn student_ids(&self) -> Vec<DbId> {
        self.students.iter().map(|s| s.student_id).collect()
    }

    pub fn discussant_ids(&self) -> Vec<DbId> {
        self.discussants.iter().map(|d| d.discussant_id).collect()
    }
}

/// One row of the pre-project fan-out query.
///
/// Relation columns are `NULL` when the row carries no detail for that
/// relation; a nil UUID is treated the same way.
#[derive(Debug, Clone, FromRow)]
pub struct PreProjectJoinRow {
    #[sqlx(flatten)]
    pub project: PreProject,

    pub advisor_id: Option<DbId>,
    pub advisor_name: Option<String>,
    pub advisor_email: Option<String>,
    pub response_status_id: Option<StatusId>,
    pub response_created_at: Option<Timestamp>,
    pub response_updated_at: Option<Timestamp>,

    pub student_id: Option<DbId>,
    pub student_name: Option<String>,
    pub student_email: Option<String>,

    pub discussant_id: Option<DbId>,
    pub discussant_name: Option<String>,
    pub discussant_email: Option<String>,

    pub accepted_advisor_id: Option<DbId>,
    pub accepted_advisor_name: Option<String>,
    pub accepted_advisor_email: Option<String>,
}

struct AggregateFold {
    aggregate: PreProjectAggregate,
    seen_advisors: HashSet<DbId>,
    seen_students: HashSet<DbId>,
    seen_discussants: HashSet<DbId>,
}

fn present(id: Option<DbId>) -> Option<DbId> {
    id.filter(|id| !id.is_nil())
}

impl AggregateFold {
    fn new(pre_project: PreProject) -> Self {
        Self {
            aggregate: PreProjectAggregate {
                pre_project,
                advisors: Vec::new(),
                students: Vec::new(),
                discussants: Vec::new(),
                accepted_advisor_info: None,
            },
            seen_advisors: HashSet::new(),
            seen_students: HashSet::new(),
            seen_discussants: HashSet::new(),
        }
    }

    fn absorb(&mut self, row: PreProjectJoinRow) {
        if let Some(id) = present(row.advisor_id) {
            if self.seen_advisors.insert(id) {
                let status = row
                    .response_status_id
                    .and_then(AdvisorStatus::from_id)
                    .unwrap_or_else(|| {
                        tracing::warn!(
                            advisor_id = %id,
                            status_id = ?row.response_status_id,
                            "Unknown advisor response status, reporting as pending"
                        );
                        AdvisorStatus::Pending
                    });
                self.aggregate.advisors.push(AdvisorResponseDetails {
                    advisor_id: id,
                    advisor_name: row.advisor_name.unwrap_or_default(),
                    advisor_email: row.advisor_email.unwrap_or_default(),
                    status,
                    created_at: row.response_created_at,
                    updated_at: row.response_updated_at,
                });
            }
        }

        if let Some(id) = present(row.student_id) {
            if self.seen_students.insert(id) {
                self.aggregate.students.push(StudentDetails {
                    student_id: id,
                    student_name: row.student_name.unwrap_or_default(),
                    student_email: row.student_email.unwrap_or_default(),
                });
            }
        }

        if let Some(id) = present(row.discussant_id) {
            if self.seen_discussants.insert(id) {
                self.aggregate.discussants.push(DiscussantDetails {
                    discussant_id: id,
                    discussant_name: row.discussant_name.unwrap_or_default(),
                    discussant_email: row.discussant_email.unwrap_or_default(),
                });
            }
        }

        if self.aggregate.accepted_advisor_info.is_none() {
            if let Some(id) = present(row.accepted_advisor_id) {
                self.aggregate.accepted_advisor_info = Some(AdvisorInfo {
                    id,
                    name: row.accepted_advisor_name.unwrap_or_default(),
                    email: row.accepted_advisor_email.unwrap_or_default(),
                });
            }
        }
    }

    fn finish(self) -> PreProjectAggregate {
        self.aggregate
    }
}
