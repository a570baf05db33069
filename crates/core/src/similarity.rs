//! Similarity-check result types and the "too similar" filter.
//!
//! The scoring itself happens in an external service; this module only
//! decides which returned candidates block a submission.

use serde::{Deserialize, Serialize};

/// Threshold sent to the scoring service with each request.
pub const DEFAULT_REQUEST_THRESHOLD: f64 = 0.3;

/// Candidates scoring strictly above this block the submission.
pub const BLOCKING_SCORE: f64 = 50.0;

/// One candidate returned by the scoring service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarProject {
    pub project_id: String,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub project_description: Option<String>,
    pub similarity_score: f64,
    /// Which relation the candidate came from (`pre_projects` or `books`).
    pub source_table: String,
}

/// Keep only the candidates that should block the submission.
pub fn blocking_matches(candidates: Vec<SimilarProject>) -> Vec<SimilarProject> {
    candidates
        .into_iter()
        .filter(|c| c.similarity_score > BLOCKING_SCORE)
        .collect()
}
