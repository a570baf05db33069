//! HTTP-level tests for the pre-project lifecycle.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use capstone_api::similarity::SimilarityScorer;
use capstone_core::error::CoreError;
use capstone_core::roles::{ROLE_ADMIN, ROLE_ADVISOR, ROLE_STUDENT};
use capstone_core::similarity::SimilarProject;
use common::{body_json, build_test_app, next_year, TestApp};
use sqlx::PgPool;

const DESCRIPTION: &str = "Soil moisture sensors driving a drip irrigation controller.";

/// Owner plus two advisors, with the owner's token.
struct Cast {
    owner_token: String,
    advisor_a: (uuid::Uuid, String),
    advisor_b: (uuid::Uuid, String),
}

async fn cast(app: &TestApp) -> Cast {
    let (owner, _) = app.user("owner", ROLE_STUDENT).await;
    Cast {
        owner_token: app.token(owner, ROLE_STUDENT),
        advisor_a: app.user("advisor_a", ROLE_ADVISOR).await,
        advisor_b: app.user("advisor_b", ROLE_ADVISOR).await,
    }
}

async fn create_project(app: &TestApp, cast: &Cast) -> serde_json::Value {
    let year = next_year();
    let advisors = format!("{}, {}", cast.advisor_a.1, cast.advisor_b.1);
    let response = app
        .multipart(
            Method::POST,
            "/api/v1/pre-projects",
            &cast.owner_token,
            &[
                ("name", "Smart irrigation"),
                ("description", DESCRIPTION),
                ("year", &year),
                ("season", "fall"),
                ("advisors", &advisors),
            ],
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"].clone()
}

fn project_uri(project: &serde_json::Value) -> String {
    format!(
        "/api/v1/pre-projects/{}",
        project["pre_project"]["id"].as_str().unwrap()
    )
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn create_returns_aggregate_with_pending_advisors(pool: PgPool) {
    let app = build_test_app(pool);
    let cast = cast(&app).await;

    let project = create_project(&app, &cast).await;

    assert_eq!(project["pre_project"]["name"], "Smart irrigation");
    assert_eq!(project["students"].as_array().unwrap().len(), 1);
    assert_eq!(project["students"][0]["student_email"], "owner@uni.edu");

    let advisors = project["advisors"].as_array().unwrap();
    assert_eq!(advisors.len(), 2);
    assert!(advisors.iter().all(|a| a["status"] == "pending"));
    assert!(project.get("accepted_advisor_info").is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn create_requires_authentication(pool: PgPool) {
    let app = build_test_app(pool);
    let response = app
        .send(
            Request::builder()
                .method(Method::GET)
                .uri("/api/v1/pre-projects")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unknown_advisor_email_is_a_field_error(pool: PgPool) {
    let app = build_test_app(pool);
    let cast = cast(&app).await;
    let year = next_year();

    let response = app
        .multipart(
            Method::POST,
            "/api/v1/pre-projects",
            &cast.owner_token,
            &[
                ("name", "Smart irrigation"),
                ("year", &year),
                ("season", "fall"),
                ("advisors", "ghost@uni.edu"),
            ],
            None,
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let json = body_json(response).await;
    assert_eq!(json["code"], "INVALID_FIELDS");
    assert_eq!(json["fields"]["advisors"], "No user found with email ghost@uni.edu");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn invalid_fields_are_all_reported(pool: PgPool) {
    let app = build_test_app(pool);
    let cast = cast(&app).await;

    let response = app
        .multipart(
            Method::POST,
            "/api/v1/pre-projects",
            &cast.owner_token,
            &[("name", "ab"), ("year", "1999"), ("season", "summer")],
            None,
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let fields = &body_json(response).await["fields"];
    assert!(fields["name"].is_string());
    assert!(fields["year"].is_string());
    assert!(fields["season"].is_string());
    assert!(fields["advisors"].is_string());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn student_cannot_join_a_second_project(pool: PgPool) {
    let app = build_test_app(pool);
    let cast = cast(&app).await;
    create_project(&app, &cast).await;

    let (other, _) = app.user("other", ROLE_STUDENT).await;
    let other_token = app.token(other, ROLE_STUDENT);
    let year = next_year();

    let response = app
        .multipart(
            Method::POST,
            "/api/v1/pre-projects",
            &other_token,
            &[
                ("name", "Another project"),
                ("year", &year),
                ("season", "spring"),
                ("students", "owner@uni.edu"),
                ("advisors", &cast.advisor_a.1),
            ],
            None,
        )
        .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert_eq!(
        json["error"],
        "Student owner@uni.edu already has an existing pre-project"
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn owner_with_a_project_is_named_in_the_conflict(pool: PgPool) {
    let app = build_test_app(pool);
    let cast = cast(&app).await;
    create_project(&app, &cast).await;
    let year = next_year();

    let response = app
        .multipart(
            Method::POST,
            "/api/v1/pre-projects",
            &cast.owner_token,
            &[
                ("name", "Second attempt"),
                ("year", &year),
                ("season", "spring"),
                ("advisors", &cast.advisor_b.1),
            ],
            None,
        )
        .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        body_json(response).await["error"],
        "Student owner@uni.edu already has an existing pre-project"
    );
}

// ---------------------------------------------------------------------------
// Files and delete
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn owner_delete_removes_project_and_file(pool: PgPool) {
    let app = build_test_app(pool);
    let cast = cast(&app).await;
    let year = next_year();

    let response = app
        .multipart(
            Method::POST,
            "/api/v1/pre-projects",
            &cast.owner_token,
            &[
                ("name", "Smart irrigation"),
                ("year", &year),
                ("season", "fall"),
                ("advisors", &cast.advisor_a.1),
            ],
            Some(("proposal.pdf", b"%PDF-1.4 proposal")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let project = body_json(response).await["data"].clone();

    let reference = project["pre_project"]["file"].as_str().unwrap().to_string();
    let stored = app.storage.path().join(&reference);
    assert!(stored.exists());

    let uri = project_uri(&project);
    let response = app.delete(&uri, &cast.owner_token).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert!(!stored.exists());
    let response = app.get(&uri, &cast.owner_token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn replacing_the_file_keeps_the_old_one_until_commit(pool: PgPool) {
    let app = build_test_app(pool);
    let cast = cast(&app).await;
    let year = next_year();

    let response = app
        .multipart(
            Method::POST,
            "/api/v1/pre-projects",
            &cast.owner_token,
            &[
                ("name", "Smart irrigation"),
                ("year", &year),
                ("season", "fall"),
                ("advisors", &cast.advisor_a.1),
            ],
            Some(("proposal.pdf", b"%PDF-1.4 first draft")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let project = body_json(response).await["data"].clone();
    let uri = project_uri(&project);
    let original = project["pre_project"]["file"].as_str().unwrap().to_string();
    assert_eq!(app.stored_files(), vec![original.clone()]);

    // A past year fails validation after the new upload was stored.
    let response = app
        .multipart(
            Method::PUT,
            &uri,
            &cast.owner_token,
            &[("year", "1999")],
            Some(("proposal-v2.pdf", b"%PDF-1.4 second draft")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(app.stored_files(), vec![original.clone()]);

    let response = app
        .multipart(
            Method::PUT,
            &uri,
            &cast.owner_token,
            &[],
            Some(("proposal-v2.pdf", b"%PDF-1.4 second draft")),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await["data"].clone();
    let replacement = updated["pre_project"]["file"].as_str().unwrap().to_string();

    assert_ne!(replacement, original);
    assert!(!app.storage.path().join(&original).exists());
    assert_eq!(app.stored_files(), vec![replacement.clone()]);
    assert_eq!(
        std::fs::read(app.storage.path().join(&replacement)).unwrap(),
        b"%PDF-1.4 second draft"
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn non_owner_cannot_delete(pool: PgPool) {
    let app = build_test_app(pool);
    let cast = cast(&app).await;
    let project = create_project(&app, &cast).await;
    let uri = project_uri(&project);

    let advisor_token = app.token(cast.advisor_a.0, ROLE_ADVISOR);
    let response = app.delete(&uri, &advisor_token).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.get(&uri, &cast.owner_token).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn update_merges_supplied_fields_only(pool: PgPool) {
    let app = build_test_app(pool);
    let cast = cast(&app).await;
    let project = create_project(&app, &cast).await;
    let uri = project_uri(&project);

    let (discussant, discussant_email) = app.user("discussant", ROLE_ADVISOR).await;
    let response = app
        .multipart(
            Method::PUT,
            &uri,
            &cast.owner_token,
            &[("discussants", &discussant_email)],
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await["data"].clone();
    assert_eq!(
        updated["discussants"][0]["discussant_id"],
        discussant.to_string()
    );

    let later = (project["pre_project"]["year"].as_i64().unwrap() + 1).to_string();
    let response = app
        .multipart(Method::PUT, &uri, &cast.owner_token, &[("year", &later)], None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await["data"].clone();

    assert_eq!(updated["pre_project"]["year"].as_i64().unwrap().to_string(), later);
    assert_eq!(updated["pre_project"]["name"], project["pre_project"]["name"]);
    assert_eq!(
        updated["pre_project"]["description"],
        project["pre_project"]["description"]
    );
    assert_eq!(updated["advisors"].as_array().unwrap().len(), 2);
    assert_eq!(updated["discussants"].as_array().unwrap().len(), 1);

    let response = app
        .multipart(Method::PUT, &uri, &cast.owner_token, &[("discussants", "")], None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await["data"].clone();
    assert!(updated["discussants"].as_array().unwrap().is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn non_admin_cannot_set_degree(pool: PgPool) {
    let app = build_test_app(pool);
    let cast = cast(&app).await;
    let project = create_project(&app, &cast).await;
    let uri = project_uri(&project);

    let response = app
        .multipart(Method::PUT, &uri, &cast.owner_token, &[("degree", "95")], None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["data"]["pre_project"]["degree"].is_null());

    let (admin, _) = app.user("admin", ROLE_ADMIN).await;
    let admin_token = app.token(admin, ROLE_ADMIN);
    let response = app
        .multipart(Method::PUT, &uri, &admin_token, &[("degree", "95")], None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["pre_project"]["degree"], 95);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn locked_project_rejects_owner_update(pool: PgPool) {
    let app = build_test_app(pool);
    let cast = cast(&app).await;
    let project = create_project(&app, &cast).await;
    let uri = project_uri(&project);

    let (admin, _) = app.user("admin", ROLE_ADMIN).await;
    let admin_token = app.token(admin, ROLE_ADMIN);
    let response = app
        .multipart(Method::PUT, &uri, &admin_token, &[("can_update", "false")], None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .multipart(Method::PUT, &uri, &cast.owner_token, &[("season", "spring")], None)
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

// ---------------------------------------------------------------------------
// Advisor responses
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn first_accept_wins_and_later_accepts_conflict(pool: PgPool) {
    let app = build_test_app(pool);
    let cast = cast(&app).await;
    let project = create_project(&app, &cast).await;
    let uri = project_uri(&project);
    let token_a = app.token(cast.advisor_a.0, ROLE_ADVISOR);
    let token_b = app.token(cast.advisor_b.0, ROLE_ADVISOR);

    let accept = serde_json::json!({ "status": "accepted" });
    let response = app
        .post_json(&format!("{uri}/responses"), &token_a, accept.clone())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["status_id"], 2);

    let response = app
        .post_json(&format!("{uri}/responses"), &token_b, accept.clone())
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .post_json(&format!("{uri}/responses"), &token_a, accept)
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        body_json(response).await["error"],
        "You have already accepted this pre-project"
    );

    let aggregate = body_json(app.get(&uri, &cast.owner_token).await).await["data"].clone();
    assert_eq!(
        aggregate["accepted_advisor_info"]["id"],
        cast.advisor_a.0.to_string()
    );
    for advisor in aggregate["advisors"].as_array().unwrap() {
        let expected = if advisor["advisor_id"] == cast.advisor_a.0.to_string() {
            "accepted"
        } else {
            "rejected"
        };
        assert_eq!(advisor["status"], expected);
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn accepted_advisor_is_kept_unless_an_admin_replaces_advisors(pool: PgPool) {
    let app = build_test_app(pool);
    let cast = cast(&app).await;
    let project = create_project(&app, &cast).await;
    let uri = project_uri(&project);

    let token_a = app.token(cast.advisor_a.0, ROLE_ADVISOR);
    let response = app
        .post_json(
            &format!("{uri}/responses"),
            &token_a,
            serde_json::json!({ "status": "accepted" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .multipart(
            Method::PUT,
            &uri,
            &cast.owner_token,
            &[("advisors", &cast.advisor_b.1)],
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        body_json(response).await["error"],
        "Advisors cannot be changed after an advisor has accepted"
    );

    let aggregate = body_json(app.get(&uri, &cast.owner_token).await).await["data"].clone();
    assert_eq!(
        aggregate["accepted_advisor_info"]["id"],
        cast.advisor_a.0.to_string()
    );
    assert_eq!(aggregate["advisors"].as_array().unwrap().len(), 2);

    // Resubmitting the same set is not a change.
    let both = format!("{}, {}", cast.advisor_b.1, cast.advisor_a.1);
    let response = app
        .multipart(Method::PUT, &uri, &cast.owner_token, &[("advisors", &both)], None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let (admin, _) = app.user("admin", ROLE_ADMIN).await;
    let admin_token = app.token(admin, ROLE_ADMIN);
    let response = app
        .multipart(
            Method::PUT,
            &uri,
            &admin_token,
            &[("advisors", &cast.advisor_b.1)],
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await["data"].clone();
    assert!(updated.get("accepted_advisor_info").is_none());
    let advisors = updated["advisors"].as_array().unwrap();
    assert_eq!(advisors.len(), 1);
    assert_eq!(advisors[0]["advisor_id"], cast.advisor_b.0.to_string());
    assert_eq!(advisors[0]["status"], "pending");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn invalid_status_is_a_field_error(pool: PgPool) {
    let app = build_test_app(pool);
    let cast = cast(&app).await;
    let project = create_project(&app, &cast).await;
    let uri = project_uri(&project);
    let token_a = app.token(cast.advisor_a.0, ROLE_ADVISOR);

    let response = app
        .post_json(
            &format!("{uri}/responses"),
            &token_a,
            serde_json::json!({ "status": "maybe" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_json(response).await["fields"]["status"].is_string());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unsolicited_advisor_is_refused(pool: PgPool) {
    let app = build_test_app(pool);
    let cast = cast(&app).await;
    let project = create_project(&app, &cast).await;
    let uri = project_uri(&project);

    let (stranger, _) = app.user("stranger", ROLE_ADVISOR).await;
    let response = app
        .post_json(
            &format!("{uri}/responses"),
            &app.token(stranger, ROLE_ADVISOR),
            serde_json::json!({ "status": "accepted" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body_json(response).await["fields"]["advisor"].is_string());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn admin_reset_clears_responses(pool: PgPool) {
    let app = build_test_app(pool);
    let cast = cast(&app).await;
    let project = create_project(&app, &cast).await;
    let uri = project_uri(&project);

    let response = app
        .post_json(&format!("{uri}/reset-advisors"), &cast.owner_token, serde_json::json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let (admin, _) = app.user("admin", ROLE_ADMIN).await;
    let admin_token = app.token(admin, ROLE_ADMIN);
    let response = app
        .post_json(&format!("{uri}/reset-advisors"), &admin_token, serde_json::json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let aggregate = body_json(response).await["data"].clone();
    assert!(aggregate["advisors"].as_array().unwrap().is_empty());
    assert!(aggregate["pre_project"]["accepted_advisor"].is_null());
}

// ---------------------------------------------------------------------------
// Promotion
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn promotion_requires_an_accepted_advisor(pool: PgPool) {
    let app = build_test_app(pool);
    let cast = cast(&app).await;
    let project = create_project(&app, &cast).await;
    let uri = project_uri(&project);

    let (admin, _) = app.user("admin", ROLE_ADMIN).await;
    let admin_token = app.token(admin, ROLE_ADMIN);

    let response = app
        .post_json(&format!("{uri}/promote"), &admin_token, serde_json::json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .post_json(
            &format!("{uri}/responses"),
            &app.token(cast.advisor_b.0, ROLE_ADVISOR),
            serde_json::json!({ "status": "accepted" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .post_json(&format!("{uri}/promote"), &cast.owner_token, serde_json::json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post_json(&format!("{uri}/promote"), &admin_token, serde_json::json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let book = body_json(response).await["data"].clone();

    assert_eq!(book["name"], "Smart irrigation");
    assert_eq!(book["advisors"].as_array().unwrap().len(), 1);
    assert_eq!(book["advisors"][0]["id"], cast.advisor_b.0.to_string());
    assert_eq!(book["students"][0]["email"], "owner@uni.edu");

    let response = app.get(&uri, &admin_token).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let book_uri = format!("/api/v1/books/{}", book["id"].as_str().unwrap());
    let response = app.get(&book_uri, &cast.owner_token).await;
    assert_eq!(response.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Similarity
// ---------------------------------------------------------------------------

struct FixedScorer(Vec<SimilarProject>);

#[async_trait]
impl SimilarityScorer for FixedScorer {
    async fn score(
        &self,
        _name: &str,
        _description: &str,
        _threshold: f64,
    ) -> Result<Vec<SimilarProject>, CoreError> {
        Ok(self.0.clone())
    }
}

fn similar(score: f64) -> SimilarProject {
    SimilarProject {
        project_id: uuid::Uuid::new_v4().to_string(),
        project_name: Some("Irrigation controller".into()),
        project_description: None,
        similarity_score: score,
        source_table: "books".into(),
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn similar_project_blocks_create(pool: PgPool) {
    let scorer = Arc::new(FixedScorer(vec![similar(80.0), similar(20.0)]));
    let app = common::build_test_app_with_scorer(pool, Some(scorer));
    let cast = cast(&app).await;
    let year = next_year();

    let response = app
        .multipart(
            Method::POST,
            "/api/v1/pre-projects",
            &cast.owner_token,
            &[
                ("name", "Smart irrigation"),
                ("description", DESCRIPTION),
                ("year", &year),
                ("season", "fall"),
                ("advisors", &cast.advisor_a.1),
            ],
            None,
        )
        .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert_eq!(json["code"], "SIMILAR_PROJECTS");
    assert_eq!(json["similar_projects"].as_array().unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn low_scores_do_not_block(pool: PgPool) {
    let scorer = Arc::new(FixedScorer(vec![similar(50.0)]));
    let app = common::build_test_app_with_scorer(pool, Some(scorer));
    let cast = cast(&app).await;

    create_project(&app, &cast).await;
}
