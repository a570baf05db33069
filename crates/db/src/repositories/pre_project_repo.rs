//! Repository for the `pre_projects` table and its membership relations.

use capstone_core::types::DbId;
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};

use crate::models::pre_project::{
    CreatePreProject, PreProject, PreProjectAggregate, PreProjectChanges, PreProjectJoinRow,
    RelationChanges,
};
use crate::repositories::AdvisorResponseRepo;

/// Unique constraint that keeps a student in at most one pre-project.
pub const STUDENT_MEMBERSHIP_CONSTRAINT: &str = "uq_pre_project_students_student";

/// Column list for the `pre_projects` table.
const COLUMNS: &str = "id, name, description, file, file_description, project_owner, \
    accepted_advisor, year, season, can_update, degree, created_at, updated_at";

/// Left-join fan-out over every relation of one pre-project.
///
/// Every related-user column is aliased so the flattened `PreProject`
/// columns stay unambiguous.
const AGGREGATE_QUERY: &str = "\
    SELECT p.id, p.name, p.description, p.file, p.file_description, p.project_owner, \
           p.accepted_advisor, p.year, p.season, p.can_update, p.degree, \
           p.created_at, p.updated_at, \
           ar.advisor_id, adv.name AS advisor_name, adv.email AS advisor_email, \
           ar.status_id AS response_status_id, \
           ar.created_at AS response_created_at, ar.updated_at AS response_updated_at, \
           ps.student_id, st.name AS student_name, st.email AS student_email, \
           pd.discussant_id, ds.name AS discussant_name, ds.email AS discussant_email, \
           aa.id AS accepted_advisor_id, aa.name AS accepted_advisor_name, \
           aa.email AS accepted_advisor_email \
    FROM pre_projects p \
    LEFT JOIN advisor_responses ar ON ar.pre_project_id = p.id \
    LEFT JOIN users adv ON adv.id = ar.advisor_id \
    LEFT JOIN pre_project_students ps ON ps.pre_project_id = p.id \
    LEFT JOIN users st ON st.id = ps.student_id \
    LEFT JOIN pre_project_discussants pd ON pd.pre_project_id = p.id \
    LEFT JOIN users ds ON ds.id = pd.discussant_id \
    LEFT JOIN users aa ON aa.id = p.accepted_advisor \
    WHERE p.id = $1";

/// A student already holding a membership in another pre-project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct StudentMembership {
    pub student_id: DbId,
    pub pre_project_id: DbId,
}

/// Provides persistence for pre-projects and their student, discussant and
/// advisor-solicitation sets.
pub struct PreProjectRepo;

impl PreProjectRepo {
    /// Insert a pre-project with its student memberships and one pending
    /// response per solicited advisor, all in one transaction.
    pub async fn create(
        pool: &PgPool,
        input: &CreatePreProject,
        students: &[DbId],
        advisors: &[DbId],
    ) -> Result<PreProject, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO pre_projects \
                (name, description, file, file_description, project_owner, year, season) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        let project = sqlx::query_as::<_, PreProject>(&query)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.file)
            .bind(&input.file_description)
            .bind(input.project_owner)
            .bind(input.year)
            .bind(&input.season)
            .fetch_one(&mut *tx)
            .await?;

        Self::set_students_inner(&mut tx, project.id, students).await?;
        AdvisorResponseRepo::solicit(&mut tx, project.id, advisors).await?;

        tx.commit().await?;
        Ok(project)
    }

    /// Find a pre-project row by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<PreProject>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM pre_projects WHERE id = $1");
        sqlx::query_as::<_, PreProject>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List pre-project rows, newest first.
    pub async fn list(
        pool: &PgPool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PreProject>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM pre_projects \
             ORDER BY created_at DESC, id \
             LIMIT $1 OFFSET $2"
        );
        sqlx::query_as::<_, PreProject>(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Load and decode the full aggregate.
    ///
    /// Accepts a pool or an open transaction (`&mut *tx`) so that a locked
    /// row can be re-read inside the same unit of work.
    pub async fn find_aggregate<'e>(
        executor: impl PgExecutor<'e>,
        id: DbId,
    ) -> Result<Option<PreProjectAggregate>, sqlx::Error> {
        let rows = sqlx::query_as::<_, PreProjectJoinRow>(AGGREGATE_QUERY)
            .bind(id)
            .fetch_all(executor)
            .await?;
        Ok(PreProjectAggregate::from_rows(rows))
    }

    /// Lock the row for the rest of the transaction.
    ///
    /// Returns `None` if the row no longer exists.
    pub async fn lock_for_update(
        tx: &mut Transaction<'_, Postgres>,
        id: DbId,
    ) -> Result<Option<PreProject>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM pre_projects WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, PreProject>(&query)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Find the first of `students` that already belongs to a pre-project
    /// other than `exclude`.
    pub async fn find_student_membership<'e>(
        executor: impl PgExecutor<'e>,
        students: &[DbId],
        exclude: Option<DbId>,
    ) -> Result<Option<StudentMembership>, sqlx::Error> {
        sqlx::query_as::<_, StudentMembership>(
            "SELECT student_id, pre_project_id FROM pre_project_students \
             WHERE student_id = ANY($1) \
               AND ($2::uuid IS NULL OR pre_project_id <> $2) \
             ORDER BY student_id \
             LIMIT 1",
        )
        .bind(students)
        .bind(exclude)
        .fetch_optional(executor)
        .await
    }

    /// Write merged scalar fields and any replaced relation sets.
    ///
    /// The caller must already hold the row lock. A replaced advisor set
    /// clears `accepted_advisor` and re-solicits every advisor as pending.
    pub async fn apply_update(
        tx: &mut Transaction<'_, Postgres>,
        id: DbId,
        changes: &PreProjectChanges,
        relations: &RelationChanges,
    ) -> Result<PreProject, sqlx::Error> {
        let query = format!(
            "UPDATE pre_projects SET \
                name = $2, \
                description = $3, \
                file = $4, \
                file_description = $5, \
                year = $6, \
                season = $7, \
                can_update = $8, \
                degree = $9, \
                accepted_advisor = CASE WHEN $10 THEN NULL ELSE accepted_advisor END \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        let project = sqlx::query_as::<_, PreProject>(&query)
            .bind(id)
            .bind(&changes.name)
            .bind(&changes.description)
            .bind(&changes.file)
            .bind(&changes.file_description)
            .bind(changes.year)
            .bind(&changes.season)
            .bind(changes.can_update)
            .bind(changes.degree)
            .bind(relations.advisors.is_some())
            .fetch_one(&mut **tx)
            .await?;

        if let Some(ref students) = relations.students {
            Self::set_students_inner(tx, id, students).await?;
        }
        if let Some(ref discussants) = relations.discussants {
            Self::set_discussants_inner(tx, id, discussants).await?;
        }
        if let Some(ref advisors) = relations.advisors {
            AdvisorResponseRepo::delete_for_project(tx, id).await?;
            AdvisorResponseRepo::solicit(tx, id, advisors).await?;
        }

        Ok(project)
    }

    /// Delete a pre-project. Memberships and responses cascade.
    ///
    /// Returns `true` if a row was removed.
    pub async fn delete(
        tx: &mut Transaction<'_, Postgres>,
        id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM pre_projects WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    /// Replace student memberships within an existing transaction.
    async fn set_students_inner(
        tx: &mut Transaction<'_, Postgres>,
        pre_project_id: DbId,
        students: &[DbId],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM pre_project_students WHERE pre_project_id = $1")
            .bind(pre_project_id)
            .execute(&mut **tx)
            .await?;

        for &student_id in students {
            sqlx::query(
                "INSERT INTO pre_project_students (pre_project_id, student_id) VALUES ($1, $2)",
            )
            .bind(pre_project_id)
            .bind(student_id)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }

    /// Replace discussant memberships within an existing transaction.
    async fn set_discussants_inner(
        tx: &mut Transaction<'_, Postgres>,
        pre_project_id: DbId,
        discussants: &[DbId],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM pre_project_discussants WHERE pre_project_id = $1")
            .bind(pre_project_id)
            .execute(&mut **tx)
            .await?;

        for &discussant_id in discussants {
            sqlx::query(
                "INSERT INTO pre_project_discussants (pre_project_id, discussant_id) \
                 VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(pre_project_id)
            .bind(discussant_id)
            .execute(&mut **tx)
            .await?;
        }

        Ok(())
    }
}
