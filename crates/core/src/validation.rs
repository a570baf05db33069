//! Structural and business-rule validation for pre-projects and books.
//!
//! Every check runs; violations are collected into a [`FieldErrors`] map
//! (first message per field wins). An empty map means the candidate is valid.

use std::collections::BTreeMap;

use serde::Serialize;
use validator::Validate;

use crate::error::CoreError;
use crate::pre_project::{Season, MAX_ADVISORS, MAX_DEGREE, MAX_STUDENTS};
use crate::types::DbId;

/// Field name -> message mapping returned to clients on validation failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a violation unless the field already has one.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    /// Record a violation when `ok` is false.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add(field, message);
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `Ok(())` when empty, otherwise [`CoreError::InvalidFields`].
    pub fn into_result(self) -> Result<(), CoreError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(CoreError::InvalidFields(self))
        }
    }

    fn absorb(&mut self, errors: validator::ValidationErrors) {
        for (field, errs) in errors.field_errors() {
            if let Some(first) = errs.first() {
                let message = first
                    .message
                    .as_deref()
                    .map(str::to_string)
                    .unwrap_or_else(|| first.code.to_string());
                self.add(field.as_ref(), message);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pre-project
// ---------------------------------------------------------------------------

/// A pre-project as it would be written, plus its proposed relation sets.
///
/// `description` and `file_description` are `None` when empty.
#[derive(Debug, Clone, Validate)]
pub struct ProjectCandidate {
    #[validate(length(
        min = 3,
        max = 600,
        message = "Project name must be between 3 and 600 characters"
    ))]
    pub name: String,
    #[validate(length(
        min = 10,
        max = 1500,
        message = "Project description must be between 10 and 1500 characters"
    ))]
    pub description: Option<String>,
    pub file: Option<String>,
    #[validate(length(
        max = 1000,
        message = "File description cannot be longer than 1000 characters"
    ))]
    pub file_description: Option<String>,
    pub project_owner: DbId,
    pub year: i32,
    pub season: String,
    pub degree: Option<i32>,
    pub students: Vec<DbId>,
    pub advisors: Vec<DbId>,
}

/// Validate a pre-project candidate against `current_year`.
pub fn validate_pre_project(candidate: &ProjectCandidate, current_year: i32) -> FieldErrors {
    let mut v = FieldErrors::new();

    if let Err(errors) = candidate.validate() {
        v.absorb(errors);
    }

    if let Some(degree) = candidate.degree.filter(|d| *d != 0) {
        v.check(
            degree <= MAX_DEGREE,
            "degree",
            "Project degree must be at most 100",
        );
        v.check(degree > 0, "degree", "Project degree must be positive");
    }

    v.check(
        candidate.season.parse::<Season>().is_ok(),
        "season",
        "Season must be either spring or fall",
    );
    v.check(
        candidate.year >= current_year,
        "year",
        "Project year must be the current year or later",
    );
    v.check(
        !candidate.project_owner.is_nil(),
        "project_owner",
        "Project owner is required",
    );

    if let Some(file) = &candidate.file {
        v.check(!file.is_empty(), "file", "Invalid file path");
    }

    check_count(&mut v, &candidate.students, MAX_STUDENTS, "students", "student");
    v.check(
        candidate.students.contains(&candidate.project_owner),
        "students",
        "The project owner must be one of the students",
    );
    check_count(&mut v, &candidate.advisors, MAX_ADVISORS, "advisors", "advisor");

    v
}

fn check_count(v: &mut FieldErrors, ids: &[DbId], max: usize, field: &str, noun: &str) {
    if ids.is_empty() {
        v.add(field, format!("At least one {noun} is required"));
    } else if ids.len() > max {
        v.add(field, format!("No more than {max} {noun}s may be added"));
    }
}

// ---------------------------------------------------------------------------
// Advisor response
// ---------------------------------------------------------------------------

/// Check a raw advisor response before it reaches the state machine.
pub fn validate_advisor_response(advisor: DbId, status: &str, solicited: &[DbId]) -> FieldErrors {
    let mut v = FieldErrors::new();
    v.check(
        matches!(status, "pending" | "accepted" | "rejected"),
        "status",
        "Invalid status. Must be 'pending', 'accepted', or 'rejected'",
    );
    v.check(
        solicited.contains(&advisor),
        "advisor",
        "The advisor is not assigned to this pre-project",
    );
    v
}

// ---------------------------------------------------------------------------
// Book
// ---------------------------------------------------------------------------

/// Snapshot of a pre-project about to be promoted into a book.
#[derive(Debug, Clone, Validate)]
pub struct BookCandidate {
    #[validate(length(
        min = 3,
        max = 600,
        message = "Book name must be between 3 and 600 characters"
    ))]
    pub name: String,
    #[validate(length(
        min = 10,
        max = 1500,
        message = "Book description must be between 10 and 1500 characters"
    ))]
    pub description: Option<String>,
    pub year: i32,
    pub season: String,
    pub students: Vec<DbId>,
    pub advisors: Vec<DbId>,
    pub discussants: Vec<DbId>,
}

/// Validate a promotion snapshot. Historical years are allowed here.
pub fn validate_book(candidate: &BookCandidate) -> FieldErrors {
    let mut v = FieldErrors::new();

    if let Err(errors) = candidate.validate() {
        v.absorb(errors);
    }

    v.check(candidate.year > 0, "year", "Book year is required");
    v.check(
        candidate.season.parse::<Season>().is_ok(),
        "season",
        "Season must be either spring or fall",
    );
    check_count(&mut v, &candidate.students, MAX_STUDENTS, "students", "student");
    v.check(
        candidate.advisors.len() == 1,
        "advisors",
        "A book must have exactly one advisor",
    );
    v
}
