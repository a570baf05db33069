//! Pre-project lifecycle coordinator.
//!
//! Orders every multi-step operation: identity resolution, the optional
//! similarity check and file uploads happen before a transaction opens;
//! validation and the membership rule run inside it against locked rows;
//! notifications and old-file cleanup happen only after commit.

pub mod input;

use std::sync::Arc;

use capstone_core::advisor_response::AdvisorStatus;
use capstone_core::error::CoreError;
use capstone_core::pre_project::FILE_CATEGORY;
use capstone_core::similarity::blocking_matches;
use capstone_core::types::DbId;
use capstone_core::validation::{
    validate_advisor_response, validate_book, validate_pre_project, BookCandidate,
    ProjectCandidate,
};
use capstone_db::models::advisor_response::{AdvisorResponse, SubmitOutcome};
use capstone_db::models::book::{BookWithDetails, CreateBook};
use capstone_db::models::pre_project::{CreatePreProject, PreProject, PreProjectAggregate};
use capstone_db::repositories::pre_project_repo::STUDENT_MEMBERSHIP_CONSTRAINT;
use capstone_db::repositories::{AdvisorResponseRepo, BookRepo, PreProjectRepo, UserRepo};
use capstone_db::DbPool;
use chrono::Datelike;

use crate::config::ServerConfig;
use crate::error::{AppError, AppResult};
use crate::identity::{resolve_all, DirectoryResolver, Identity, IdentityResolver};
use crate::middleware::auth::AuthUser;
use crate::notifications::{notify_all, Notification, NotificationKind, Notifier, WsNotifier};
use crate::similarity::{HttpSimilarityScorer, SimilarityScorer};
use crate::storage::{FileStorage, LocalFileStorage};
use crate::ws::WsManager;

pub use input::{NewPreProject, PreProjectPatch, ResolvedRelations, Upload};

/// External services the coordinator depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn IdentityResolver>,
    pub files: Arc<dyn FileStorage>,
    /// `None` disables the similarity check.
    pub similarity: Option<Arc<dyn SimilarityScorer>>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    /// Production adapters: the `users` table, local disk, the HTTP scorer
    /// (when configured) and WebSocket push.
    pub fn from_config(
        pool: &DbPool,
        config: &ServerConfig,
        ws_manager: Arc<WsManager>,
    ) -> Result<Self, reqwest::Error> {
        let similarity = match &config.similarity_service_url {
            Some(url) => Some(Arc::new(HttpSimilarityScorer::new(url.clone())?)
                as Arc<dyn SimilarityScorer>),
            None => None,
        };

        Ok(Self {
            identity: Arc::new(DirectoryResolver::new(pool.clone())),
            files: Arc::new(LocalFileStorage::new(config.storage_root.clone())),
            similarity,
            notifier: Arc::new(WsNotifier::new(ws_manager)),
        })
    }
}

/// Coordinates create, update, delete, respond, reset and promote.
pub struct PreProjectLifecycle {
    pool: DbPool,
    collaborators: Collaborators,
    similarity_threshold: f64,
}

/// What an update transaction changed, for post-commit work.
struct UpdateApplied {
    project: PreProject,
    replaced_file: Option<String>,
    resolicited: Option<Vec<DbId>>,
}

fn not_found(id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "PreProject",
        id,
    })
}

fn current_year() -> i32 {
    chrono::Utc::now().year()
}

fn is_membership_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err)
            if db_err.constraint() == Some(STUDENT_MEMBERSHIP_CONSTRAINT)
    )
}

impl PreProjectLifecycle {
    pub fn new(pool: DbPool, collaborators: Collaborators, similarity_threshold: f64) -> Self {
        Self {
            pool,
            collaborators,
            similarity_threshold,
        }
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn get(&self, id: DbId) -> AppResult<PreProjectAggregate> {
        PreProjectRepo::find_aggregate(&self.pool, id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    pub async fn list(&self, limit: i64, offset: i64) -> AppResult<Vec<PreProject>> {
        Ok(PreProjectRepo::list(&self.pool, limit, offset).await?)
    }

    pub async fn get_book(&self, id: DbId) -> AppResult<BookWithDetails> {
        BookRepo::find_with_details(&self.pool, id)
            .await?
            .ok_or(AppError::Core(CoreError::NotFound { entity: "Book", id }))
    }

    // -----------------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------------

    /// Create a pre-project owned by `owner`. The owner is always one of
    /// the students.
    pub async fn create(
        &self,
        owner: &AuthUser,
        new: NewPreProject,
    ) -> AppResult<PreProjectAggregate> {
        let identity = self.collaborators.identity.as_ref();
        let student_identities = resolve_all(identity, "students", &new.students).await?;
        let advisor_identities = resolve_all(identity, "advisors", &new.advisors).await?;

        let mut students = vec![owner.user_id];
        students.extend(
            student_identities
                .iter()
                .map(|i| i.id)
                .filter(|id| *id != owner.user_id),
        );
        let advisors: Vec<DbId> = advisor_identities.iter().map(|i| i.id).collect();

        let description = input::non_empty(new.description);
        let file_description = input::non_empty(new.file_description);

        let candidate = ProjectCandidate {
            name: new.name.clone(),
            description: description.clone(),
            file: None,
            file_description: file_description.clone(),
            project_owner: owner.user_id,
            year: new.year,
            season: new.season.clone(),
            degree: None,
            students: students.clone(),
            advisors: advisors.clone(),
        };
        validate_pre_project(&candidate, current_year()).into_result()?;

        if let Some(taken) =
            PreProjectRepo::find_student_membership(&self.pool, &students, None).await?
        {
            return Err(self
                .membership_conflict(taken.student_id, &student_identities)
                .await);
        }

        self.check_similarity(&new.name, description.as_deref(), None)
            .await?;

        let file = match &new.file {
            Some(upload) => Some(self.store(upload).await?),
            None => None,
        };

        let create = CreatePreProject {
            name: new.name,
            description,
            file: file.clone(),
            file_description,
            project_owner: owner.user_id,
            year: new.year,
            season: new.season,
        };

        let project = match PreProjectRepo::create(&self.pool, &create, &students, &advisors).await
        {
            Ok(project) => project,
            Err(err) => {
                self.discard_file(file.as_deref()).await;
                return Err(self
                    .explain_membership_race(err, &students, None, &student_identities)
                    .await);
            }
        };

        tracing::info!(
            pre_project_id = %project.id,
            owner = %owner.user_id,
            students = students.len(),
            advisors = advisors.len(),
            "Pre-project created"
        );

        let notification = Notification::new(
            NotificationKind::AdvisorSolicited,
            project.id,
            &project.name,
            "You have been asked to advise a pre-project",
        );
        notify_all(self.collaborators.notifier.as_ref(), &advisors, &notification).await;

        self.get(project.id).await
    }

    // -----------------------------------------------------------------------
    // Update
    // -----------------------------------------------------------------------

    /// Merge `patch` onto the pre-project. Omitted fields keep their value.
    pub async fn update(
        &self,
        requester: &AuthUser,
        id: DbId,
        patch: PreProjectPatch,
    ) -> AppResult<PreProjectAggregate> {
        let identity = self.collaborators.identity.as_ref();
        let student_identities = match &patch.students {
            Some(emails) => Some(resolve_all(identity, "students", emails).await?),
            None => None,
        };
        let advisor_identities = match &patch.advisors {
            Some(emails) => Some(resolve_all(identity, "advisors", emails).await?),
            None => None,
        };
        let discussant_identities = match &patch.discussants {
            Some(emails) => Some(resolve_all(identity, "discussants", emails).await?),
            None => None,
        };

        let ids = |list: &Option<Vec<Identity>>| {
            list.as_ref()
                .map(|items| items.iter().map(|i| i.id).collect::<Vec<_>>())
        };
        let relations = ResolvedRelations {
            students: ids(&student_identities),
            advisors: ids(&advisor_identities),
            discussants: ids(&discussant_identities),
        };

        if patch.touches_text() && self.collaborators.similarity.is_some() {
            let current = PreProjectRepo::find_by_id(&self.pool, id)
                .await?
                .ok_or_else(|| not_found(id))?;
            let name = patch.name.clone().unwrap_or(current.name);
            let description = match &patch.description {
                Some(value) => input::non_empty(value.clone()),
                None => current.description,
            };
            self.check_similarity(&name, description.as_deref(), Some(id))
                .await?;
        }

        let new_file = match &patch.file {
            Some(upload) => Some(self.store(upload).await?),
            None => None,
        };

        let known = student_identities.unwrap_or_default();
        let applied = match self
            .apply_update(requester, id, &patch, new_file.clone(), relations, &known)
            .await
        {
            Ok(applied) => applied,
            Err(err) => {
                self.discard_file(new_file.as_deref()).await;
                return Err(err);
            }
        };

        if let Some(old) = applied.replaced_file.as_deref() {
            self.discard_file(Some(old)).await;
        }

        if let Some(advisors) = &applied.resolicited {
            let notification = Notification::new(
                NotificationKind::AdvisorSolicited,
                id,
                &applied.project.name,
                "You have been asked to advise a pre-project",
            );
            notify_all(self.collaborators.notifier.as_ref(), advisors, &notification).await;
        }

        tracing::info!(pre_project_id = %id, user_id = %requester.user_id, "Pre-project updated");

        self.get(id).await
    }

    async fn apply_update(
        &self,
        requester: &AuthUser,
        id: DbId,
        patch: &PreProjectPatch,
        new_file: Option<String>,
        relations: ResolvedRelations,
        known_students: &[Identity],
    ) -> AppResult<UpdateApplied> {
        let mut tx = self.pool.begin().await?;

        let locked = PreProjectRepo::lock_for_update(&mut tx, id)
            .await?
            .ok_or_else(|| not_found(id))?;

        if !requester.is_admin() {
            if locked.project_owner != requester.user_id {
                return Err(AppError::Core(CoreError::Forbidden(
                    "Only the project owner can update this pre-project".into(),
                )));
            }
            if !locked.can_update {
                return Err(AppError::Core(CoreError::Forbidden(
                    "This pre-project can no longer be updated".into(),
                )));
            }
        }

        let current = PreProjectRepo::find_aggregate(&mut *tx, id)
            .await?
            .ok_or_else(|| not_found(id))?;

        let merged = input::merge_update(
            &current,
            patch,
            new_file.clone(),
            relations,
            requester.is_admin(),
        );
        validate_pre_project(&merged.candidate, current_year()).into_result()?;

        if let Some(students) = &merged.relations.students {
            if let Some(taken) =
                PreProjectRepo::find_student_membership(&mut *tx, students, Some(id)).await?
            {
                return Err(self.membership_conflict(taken.student_id, known_students).await);
            }
        }

        if !requester.is_admin()
            && merged.relations.advisors.is_some()
            && current.pre_project.accepted_advisor.is_some()
        {
            return Err(AppError::Core(CoreError::Conflict(
                "Advisors cannot be changed after an advisor has accepted".into(),
            )));
        }

        let project =
            match PreProjectRepo::apply_update(&mut tx, id, &merged.changes, &merged.relations)
                .await
            {
                Ok(project) => project,
                Err(err) => {
                    drop(tx);
                    let students = merged.relations.students.as_deref().unwrap_or_default();
                    return Err(self
                        .explain_membership_race(err, students, Some(id), known_students)
                        .await);
                }
            };

        tx.commit().await?;

        let replaced_file = match (&new_file, current.pre_project.file) {
            (Some(new), Some(old)) if *new != old => Some(old),
            _ => None,
        };

        Ok(UpdateApplied {
            project,
            replaced_file,
            resolicited: merged.relations.advisors,
        })
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    /// Delete a pre-project. Only its owner may do so.
    pub async fn delete(&self, requester: &AuthUser, id: DbId) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        let locked = PreProjectRepo::lock_for_update(&mut tx, id)
            .await?
            .ok_or_else(|| not_found(id))?;
        if locked.project_owner != requester.user_id {
            return Err(AppError::Core(CoreError::Forbidden(
                "Unauthorized to delete this pre-project".into(),
            )));
        }

        PreProjectRepo::delete(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(pre_project_id = %id, user_id = %requester.user_id, "Pre-project deleted");

        self.discard_file(locked.file.as_deref()).await;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Advisor responses
    // -----------------------------------------------------------------------

    /// Record the authenticated advisor's response.
    pub async fn respond(
        &self,
        advisor: &AuthUser,
        id: DbId,
        status: &str,
    ) -> AppResult<AdvisorResponse> {
        let project = PreProjectRepo::find_by_id(&self.pool, id)
            .await?
            .ok_or_else(|| not_found(id))?;

        let solicited: Vec<DbId> = AdvisorResponseRepo::list_for_project(&self.pool, id)
            .await?
            .into_iter()
            .map(|r| r.advisor_id)
            .collect();
        validate_advisor_response(advisor.user_id, status, &solicited).into_result()?;

        let status: AdvisorStatus = status.parse()?;

        let response =
            match AdvisorResponseRepo::submit(&self.pool, id, advisor.user_id, status).await? {
                SubmitOutcome::Recorded(response) | SubmitOutcome::Accepted(response) => response,
                SubmitOutcome::ProjectNotFound => return Err(not_found(id)),
                SubmitOutcome::Refused(refusal) => {
                    tracing::debug!(
                        pre_project_id = %id,
                        advisor_id = %advisor.user_id,
                        reason = %refusal,
                        "Advisor response refused"
                    );
                    return Err(CoreError::from(refusal).into());
                }
            };

        tracing::info!(
            pre_project_id = %id,
            advisor_id = %advisor.user_id,
            status = %status,
            "Advisor response recorded"
        );

        let kind = match status {
            AdvisorStatus::Accepted => Some(NotificationKind::AdvisorAccepted),
            AdvisorStatus::Rejected => Some(NotificationKind::AdvisorRejected),
            AdvisorStatus::Pending => None,
        };
        if let Some(kind) = kind {
            let notification = Notification::new(
                kind,
                id,
                &project.name,
                format!("An advisor has {status} your pre-project"),
            );
            self.collaborators
                .notifier
                .notify(project.project_owner, &notification)
                .await;
        }

        Ok(response)
    }

    /// Clear the accepted advisor and every response row.
    pub async fn reset(&self, id: DbId) -> AppResult<PreProjectAggregate> {
        if !AdvisorResponseRepo::reset(&self.pool, id).await? {
            return Err(not_found(id));
        }
        tracing::info!(pre_project_id = %id, "Advisor responses reset");
        self.get(id).await
    }

    // -----------------------------------------------------------------------
    // Promotion
    // -----------------------------------------------------------------------

    /// Archive an accepted pre-project as a book and delete the source row,
    /// in one transaction.
    pub async fn promote(&self, id: DbId) -> AppResult<BookWithDetails> {
        let mut tx = self.pool.begin().await?;

        PreProjectRepo::lock_for_update(&mut tx, id)
            .await?
            .ok_or_else(|| not_found(id))?;
        let aggregate = PreProjectRepo::find_aggregate(&mut *tx, id)
            .await?
            .ok_or_else(|| not_found(id))?;

        let project = &aggregate.pre_project;
        let Some(accepted) = project.accepted_advisor else {
            return Err(AppError::Core(CoreError::Conflict(
                "Pre-project has no accepted advisor yet".into(),
            )));
        };

        let candidate = BookCandidate {
            name: project.name.clone(),
            description: project.description.clone(),
            year: project.year,
            season: project.season.clone(),
            students: aggregate.student_ids(),
            advisors: vec![accepted],
            discussants: aggregate.discussant_ids(),
        };
        validate_book(&candidate).into_result()?;

        let book = BookRepo::create(
            &mut tx,
            &CreateBook {
                name: candidate.name,
                description: candidate.description,
                file: project.file.clone(),
                year: candidate.year,
                season: candidate.season,
                students: candidate.students.clone(),
                advisors: candidate.advisors,
                discussants: candidate.discussants,
            },
        )
        .await?;
        PreProjectRepo::delete(&mut tx, id).await?;

        tx.commit().await?;

        tracing::info!(pre_project_id = %id, book_id = %book.id, "Pre-project promoted to book");

        let notification = Notification::new(
            NotificationKind::PromotedToBook,
            id,
            &project.name,
            "Your pre-project has been archived as a book",
        );
        notify_all(
            self.collaborators.notifier.as_ref(),
            &candidate.students,
            &notification,
        )
        .await;

        BookRepo::find_with_details(&self.pool, book.id)
            .await?
            .ok_or(AppError::Core(CoreError::NotFound {
                entity: "Book",
                id: book.id,
            }))
    }

    // -----------------------------------------------------------------------
    // Collaborator helpers
    // -----------------------------------------------------------------------

    /// Fail with [`CoreError::TooSimilar`] when the scorer reports a blocking
    /// match. `exclude` drops the project's own entry on update.
    async fn check_similarity(
        &self,
        name: &str,
        description: Option<&str>,
        exclude: Option<DbId>,
    ) -> AppResult<()> {
        let Some(scorer) = &self.collaborators.similarity else {
            return Ok(());
        };

        let candidates = scorer
            .score(name, description.unwrap_or(""), self.similarity_threshold)
            .await?;
        let own = exclude.map(|id| id.to_string());
        let blocking: Vec<_> = blocking_matches(candidates)
            .into_iter()
            .filter(|c| own.as_deref() != Some(c.project_id.as_str()))
            .collect();

        if blocking.is_empty() {
            Ok(())
        } else {
            tracing::info!(matches = blocking.len(), "Similarity check blocked the project");
            Err(AppError::Core(CoreError::TooSimilar(blocking)))
        }
    }

    async fn store(&self, upload: &Upload) -> AppResult<String> {
        Ok(self
            .collaborators
            .files
            .save(FILE_CATEGORY, &upload.file_name, &upload.data)
            .await?)
    }

    /// Best-effort file removal; failures are logged, never returned.
    /// Conflict naming the student who already belongs to another
    /// pre-project, by email. Students outside `known` (the owner, usually)
    /// are looked up in the directory.
    async fn membership_conflict(&self, student_id: DbId, known: &[Identity]) -> AppError {
        let email = match known.iter().find(|i| i.id == student_id) {
            Some(identity) => Some(identity.email.clone()),
            None => match UserRepo::find_by_id(&self.pool, student_id).await {
                Ok(user) => user.map(|u| u.email),
                Err(err) => {
                    tracing::warn!(student_id = %student_id, error = %err, "Student lookup failed");
                    None
                }
            },
        };
        let label = email.unwrap_or_else(|| student_id.to_string());
        AppError::Core(CoreError::Conflict(format!(
            "Student {label} already has an existing pre-project"
        )))
    }

    /// A concurrent writer can claim a student between the membership check
    /// and the insert. The unique constraint catches it; re-read the winner
    /// so the conflict names the student like the pre-check does.
    async fn explain_membership_race(
        &self,
        err: sqlx::Error,
        students: &[DbId],
        exclude: Option<DbId>,
        known: &[Identity],
    ) -> AppError {
        if !is_membership_violation(&err) {
            return err.into();
        }
        match PreProjectRepo::find_student_membership(&self.pool, students, exclude).await {
            Ok(Some(taken)) => self.membership_conflict(taken.student_id, known).await,
            _ => err.into(),
        }
    }

    async fn discard_file(&self, reference: Option<&str>) {
        let Some(reference) = reference else {
            return;
        };
        if let Err(e) = self.collaborators.files.delete(reference).await {
            tracing::warn!(file = %reference, error = %e, "Failed to delete stored file");
        }
    }
}
