//! Inputs to the lifecycle coordinator and the update merge.
//!
//! Updates are explicit-presence: an outer `None` means "not supplied, keep
//! the current value", while `Some(None)` (or an empty list) means "supplied
//! empty". [`merge_update`] folds a patch onto the current aggregate and
//! produces both the row to write and the candidate to validate.

use std::collections::HashSet;

use capstone_core::types::DbId;
use capstone_core::validation::ProjectCandidate;
use capstone_db::models::pre_project::{PreProjectAggregate, PreProjectChanges, RelationChanges};

/// An uploaded file that has not been stored yet.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub data: Vec<u8>,
}

/// Everything needed to create a pre-project. People are named by email.
#[derive(Debug, Clone, Default)]
pub struct NewPreProject {
    pub name: String,
    pub description: Option<String>,
    pub file: Option<Upload>,
    pub file_description: Option<String>,
    pub year: i32,
    pub season: String,
    pub students: Vec<String>,
    pub advisors: Vec<String>,
}

/// A partial update. See the module docs for presence semantics.
#[derive(Debug, Clone, Default)]
pub struct PreProjectPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub file: Option<Upload>,
    pub file_description: Option<Option<String>>,
    pub year: Option<i32>,
    pub season: Option<String>,
    /// Admin only. `Some(None)` or `Some(Some(0))` clears the degree.
    pub degree: Option<Option<i32>>,
    /// Admin only.
    pub can_update: Option<bool>,
    pub students: Option<Vec<String>>,
    pub advisors: Option<Vec<String>>,
    pub discussants: Option<Vec<String>>,
}

impl PreProjectPatch {
    /// Whether the text the similarity check looks at is being changed.
    pub fn touches_text(&self) -> bool {
        self.name.is_some() || self.description.is_some()
    }
}

/// Relation sets from a patch, already resolved to user ids.
#[derive(Debug, Clone, Default)]
pub struct ResolvedRelations {
    pub students: Option<Vec<DbId>>,
    pub advisors: Option<Vec<DbId>>,
    pub discussants: Option<Vec<DbId>>,
}

/// Result of folding a patch onto the current state.
#[derive(Debug, Clone)]
pub struct MergedUpdate {
    pub changes: PreProjectChanges,
    /// Only sets that actually differ from the current ones are `Some`,
    /// except discussants, which are replaced whenever supplied.
    pub relations: RelationChanges,
    pub candidate: ProjectCandidate,
}

/// Treat empty text as absent.
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn same_set(a: &[DbId], b: &[DbId]) -> bool {
    a.iter().collect::<HashSet<_>>() == b.iter().collect::<HashSet<_>>()
}

/// Fold `patch` onto `current`.
///
/// `new_file` is the stored reference of an upload in this request.
/// `degree` and `can_update` are only honoured when `is_admin`.
pub fn merge_update(
    current: &PreProjectAggregate,
    patch: &PreProjectPatch,
    new_file: Option<String>,
    relations: ResolvedRelations,
    is_admin: bool,
) -> MergedUpdate {
    let p = &current.pre_project;

    let name = patch.name.clone().unwrap_or_else(|| p.name.clone());
    let description = match &patch.description {
        Some(value) => non_empty(value.clone()),
        None => p.description.clone(),
    };
    let file_description = match &patch.file_description {
        Some(value) => non_empty(value.clone()),
        None => p.file_description.clone(),
    };
    let file = new_file.or_else(|| p.file.clone());
    let year = patch.year.unwrap_or(p.year);
    let season = patch.season.clone().unwrap_or_else(|| p.season.clone());

    let (degree, can_update) = if is_admin {
        let degree = match patch.degree {
            Some(value) => value.filter(|d| *d != 0),
            None => p.degree,
        };
        (degree, patch.can_update.unwrap_or(p.can_update))
    } else {
        (p.degree, p.can_update)
    };

    let current_students = current.student_ids();
    let current_advisors = current.advisor_ids();

    let students = relations
        .students
        .filter(|ids| !same_set(ids, &current_students));
    let advisors = relations
        .advisors
        .filter(|ids| !same_set(ids, &current_advisors));

    let candidate = ProjectCandidate {
        name: name.clone(),
        description: description.clone(),
        file: file.clone(),
        file_description: file_description.clone(),
        project_owner: p.project_owner,
        year,
        season: season.clone(),
        degree,
        students: students.clone().unwrap_or(current_students),
        advisors: advisors.clone().unwrap_or(current_advisors),
    };

    MergedUpdate {
        changes: PreProjectChanges {
            name,
            description,
            file,
            file_description,
            year,
            season,
            can_update,
            degree,
        },
        relations: RelationChanges {
            students,
            advisors,
            discussants: relations.discussants,
        },
        candidate,
    }
}
