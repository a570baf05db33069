//! Repository for the `advisor_responses` table.
//!
//! Every write here takes the parent `pre_projects` row lock before touching
//! response rows, so concurrent accepts, rejects and resets on one project
//! queue up instead of deadlocking.

use capstone_core::advisor_response::{
    check_transition, AdvisorStatus, ResponseState, StatusId, TransitionError,
};
use capstone_core::types::DbId;
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::advisor_response::{AdvisorResponse, SubmitOutcome};

/// Column list for the `advisor_responses` table.
const COLUMNS: &str = "id, pre_project_id, advisor_id, status_id, created_at, updated_at";

/// Provides the advisor response state transitions.
pub struct AdvisorResponseRepo;

impl AdvisorResponseRepo {
    /// Record `status` for `advisor` on `pre_project_id`.
    ///
    /// On accept, the project's accepted-advisor slot is claimed with a
    /// conditional update (`WHERE accepted_advisor IS NULL`) before the
    /// response row is written; losing that claim refuses the request with
    /// [`TransitionError::AcceptedByAnother`]. A successful claim forces every
    /// sibling response to rejected in the same transaction.
    pub async fn submit(
        pool: &PgPool,
        pre_project_id: DbId,
        advisor_id: DbId,
        status: AdvisorStatus,
    ) -> Result<SubmitOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let slot: Option<Option<DbId>> = sqlx::query_scalar(
            "SELECT accepted_advisor FROM pre_projects WHERE id = $1 FOR UPDATE",
        )
        .bind(pre_project_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(accepted_advisor) = slot else {
            return Ok(SubmitOutcome::ProjectNotFound);
        };

        let current: Option<StatusId> = sqlx::query_scalar(
            "SELECT status_id FROM advisor_responses \
             WHERE pre_project_id = $1 AND advisor_id = $2",
        )
        .bind(pre_project_id)
        .bind(advisor_id)
        .fetch_optional(&mut *tx)
        .await?;

        let state = ResponseState {
            accepted_advisor,
            current: current
                .map(|id| AdvisorStatus::from_id(id).unwrap_or(AdvisorStatus::Pending)),
        };
        if let Err(refusal) = check_transition(state, advisor_id, status) {
            return Ok(SubmitOutcome::Refused(refusal));
        }

        if status == AdvisorStatus::Accepted {
            let claimed = sqlx::query(
                "UPDATE pre_projects SET accepted_advisor = $2 \
                 WHERE id = $1 AND accepted_advisor IS NULL",
            )
            .bind(pre_project_id)
            .bind(advisor_id)
            .execute(&mut *tx)
            .await?;

            if claimed.rows_affected() == 0 {
                tracing::debug!(
                    pre_project_id = %pre_project_id,
                    advisor_id = %advisor_id,
                    "Lost accepted-advisor claim"
                );
                return Ok(SubmitOutcome::Refused(TransitionError::AcceptedByAnother));
            }
        }

        let query = format!(
            "INSERT INTO advisor_responses (pre_project_id, advisor_id, status_id) \
             VALUES ($1, $2, $3) \
             ON CONFLICT ON CONSTRAINT uq_advisor_responses_project_advisor \
             DO UPDATE SET status_id = EXCLUDED.status_id \
             RETURNING {COLUMNS}"
        );
        let response = sqlx::query_as::<_, AdvisorResponse>(&query)
            .bind(pre_project_id)
            .bind(advisor_id)
            .bind(status.id())
            .fetch_one(&mut *tx)
            .await?;

        if status == AdvisorStatus::Accepted {
            sqlx::query(
                "UPDATE advisor_responses SET status_id = $3 \
                 WHERE pre_project_id = $1 AND advisor_id <> $2 AND status_id <> $3",
            )
            .bind(pre_project_id)
            .bind(advisor_id)
            .bind(AdvisorStatus::Rejected.id())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(match status {
            AdvisorStatus::Accepted => SubmitOutcome::Accepted(response),
            _ => SubmitOutcome::Recorded(response),
        })
    }

    /// Clear the accepted advisor and delete every response row.
    ///
    /// Returns `false` if the pre-project does not exist.
    pub async fn reset(pool: &PgPool, pre_project_id: DbId) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let result = sqlx::query("UPDATE pre_projects SET accepted_advisor = NULL WHERE id = $1")
            .bind(pre_project_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        Self::delete_for_project(&mut tx, pre_project_id).await?;

        tx.commit().await?;
        Ok(true)
    }

    /// List every response row for a pre-project.
    pub async fn list_for_project(
        pool: &PgPool,
        pre_project_id: DbId,
    ) -> Result<Vec<AdvisorResponse>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM advisor_responses \
             WHERE pre_project_id = $1 \
             ORDER BY created_at, advisor_id"
        );
        sqlx::query_as::<_, AdvisorResponse>(&query)
            .bind(pre_project_id)
            .fetch_all(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Transaction helpers
    // -----------------------------------------------------------------------

    /// Insert a pending response for each advisor. Existing rows are kept.
    pub(crate) async fn solicit(
        tx: &mut Transaction<'_, Postgres>,
        pre_project_id: DbId,
        advisors: &[DbId],
    ) -> Result<(), sqlx::Error> {
        for &advisor_id in advisors {
            sqlx::query(
                "INSERT INTO advisor_responses (pre_project_id, advisor_id, status_id) \
                 VALUES ($1, $2, $3) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(pre_project_id)
            .bind(advisor_id)
            .bind(AdvisorStatus::Pending.id())
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    pub(crate) async fn delete_for_project(
        tx: &mut Transaction<'_, Postgres>,
        pre_project_id: DbId,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM advisor_responses WHERE pre_project_id = $1")
            .bind(pre_project_id)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }
}
