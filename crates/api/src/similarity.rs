//! Client for the external project-similarity scoring service.

use std::time::Duration;

use async_trait::async_trait;
use capstone_core::error::CoreError;
use capstone_core::similarity::SimilarProject;
use serde::{Deserialize, Serialize};

/// Request timeout for the scoring service.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Scores a proposed project against existing pre-projects and books.
#[async_trait]
pub trait SimilarityScorer: Send + Sync {
    async fn score(
        &self,
        name: &str,
        description: &str,
        threshold: f64,
    ) -> Result<Vec<SimilarProject>, CoreError>;
}

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    project_name: &'a str,
    project_description: &'a str,
    similarity_threshold: f64,
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    #[serde(default)]
    similar_projects: Vec<serde_json::Value>,
}

/// Talks to the scoring service over HTTP.
pub struct HttpSimilarityScorer {
    client: reqwest::Client,
    url: String,
}

impl HttpSimilarityScorer {
    pub fn new(url: String) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl SimilarityScorer for HttpSimilarityScorer {
    async fn score(
        &self,
        name: &str,
        description: &str,
        threshold: f64,
    ) -> Result<Vec<SimilarProject>, CoreError> {
        let response = self
            .client
            .post(&self.url)
            .json(&ScoreRequest {
                project_name: name,
                project_description: description,
                similarity_threshold: threshold,
            })
            .send()
            .await
            .map_err(|e| CoreError::Upstream(format!("similarity request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CoreError::Upstream(format!(
                "similarity service returned {}",
                response.status()
            )));
        }

        let body: ScoreResponse = response
            .json()
            .await
            .map_err(|e| CoreError::Upstream(format!("similarity response unreadable: {e}")))?;

        Ok(decode_candidates(body.similar_projects))
    }
}

/// Keep the candidates that carry a score and a source; skip the rest.
fn decode_candidates(raw: Vec<serde_json::Value>) -> Vec<SimilarProject> {
    raw.into_iter()
        .filter_map(|value| match serde_json::from_value::<SimilarProject>(value) {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed similarity candidate");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn malformed_candidates_are_skipped() {
        let raw = vec![
            json!({"project_id": "p1", "similarity_score": 71.0, "source_table": "pre_projects"}),
            json!({"project_id": "p2", "similarity_score": "high"}),
            json!({"project_id": "p3", "similarity_score": 12.5, "source_table": "books",
                   "project_name": "Library kiosk"}),
        ];
        let decoded = decode_candidates(raw);
        let ids: Vec<&str> = decoded.iter().map(|c| c.project_id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p3"]);
        assert_eq!(decoded[1].project_name.as_deref(), Some("Library kiosk"));
    }
}
