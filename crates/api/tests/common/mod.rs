#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use capstone_api::auth::jwt::{generate_access_token, JwtConfig};
use capstone_api::config::ServerConfig;
use capstone_api::identity::DirectoryResolver;
use capstone_api::lifecycle::{Collaborators, PreProjectLifecycle};
use capstone_api::notifications::WsNotifier;
use capstone_api::router::build_app_router;
use capstone_api::similarity::SimilarityScorer;
use capstone_api::state::AppState;
use capstone_api::storage::LocalFileStorage;
use capstone_api::ws::WsManager;
use capstone_core::similarity::DEFAULT_REQUEST_THRESHOLD;
use capstone_core::types::DbId;
use capstone_db::models::user::CreateUser;
use capstone_db::repositories::UserRepo;
use chrono::Datelike;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tempfile::TempDir;
use tower::ServiceExt;

const TEST_SECRET: &str = "test-secret-that-is-long-enough-for-hs256";
const BOUNDARY: &str = "capstone-test-boundary";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config(storage: &TempDir) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        jwt: JwtConfig {
            secret: TEST_SECRET.to_string(),
            access_token_expiry_mins: 15,
        },
        storage_root: storage.path().to_path_buf(),
        similarity_service_url: None,
        similarity_threshold: DEFAULT_REQUEST_THRESHOLD,
    }
}

/// A router plus the handles tests inspect directly.
pub struct TestApp {
    pub router: Router,
    pub pool: PgPool,
    pub config: ServerConfig,
    pub ws_manager: Arc<WsManager>,
    /// Kept alive for the duration of the test; uploads land here.
    pub storage: TempDir,
}

/// Build the full application with all middleware layers, backed by a
/// temporary file store and no similarity service.
pub fn build_test_app(pool: PgPool) -> TestApp {
    build_test_app_with_scorer(pool, None)
}

pub fn build_test_app_with_scorer(
    pool: PgPool,
    scorer: Option<Arc<dyn SimilarityScorer>>,
) -> TestApp {
    let storage = TempDir::new().unwrap();
    let config = test_config(&storage);
    let ws_manager = Arc::new(WsManager::new());

    let collaborators = Collaborators {
        identity: Arc::new(DirectoryResolver::new(pool.clone())),
        files: Arc::new(LocalFileStorage::new(storage.path())),
        similarity: scorer,
        notifier: Arc::new(WsNotifier::new(Arc::clone(&ws_manager))),
    };
    let lifecycle = Arc::new(PreProjectLifecycle::new(
        pool.clone(),
        collaborators,
        config.similarity_threshold,
    ));

    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
        lifecycle,
    };

    TestApp {
        router: build_app_router(state, &config),
        pool,
        config,
        ws_manager,
        storage,
    }
}

impl TestApp {
    /// Insert a user and return `(id, email)`.
    pub async fn user(&self, name: &str, role: &str) -> (DbId, String) {
        let email = format!("{name}@uni.edu");
        let user = UserRepo::create(
            &self.pool,
            &CreateUser {
                name: name.to_string(),
                email: email.clone(),
                role: role.to_string(),
            },
        )
        .await
        .unwrap();
        (user.id, email)
    }

    pub fn token(&self, user_id: DbId, role: &str) -> String {
        generate_access_token(user_id, role, &self.config.jwt).unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, token: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .method(Method::GET)
                .uri(uri)
                .header("authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .method(Method::DELETE)
                .uri(uri)
                .header("authorization", format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn post_json(
        &self,
        uri: &str,
        token: &str,
        body: serde_json::Value,
    ) -> Response<Body> {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header("authorization", format!("Bearer {token}"))
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Send a `multipart/form-data` request with text fields and an
    /// optional `file` part.
    pub async fn multipart(
        &self,
        method: Method,
        uri: &str,
        token: &str,
        fields: &[(&str, &str)],
        file: Option<(&str, &[u8])>,
    ) -> Response<Body> {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("authorization", format!("Bearer {token}"))
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(multipart_body(fields, file)))
                .unwrap(),
        )
        .await
    }

    /// Every file reference currently in the temporary store, sorted.
    pub fn stored_files(&self) -> Vec<String> {
        let mut references = Vec::new();
        let Ok(categories) = std::fs::read_dir(self.storage.path()) else {
            return references;
        };
        for category in categories {
            let category = category.unwrap();
            for file in std::fs::read_dir(category.path()).unwrap() {
                let file = file.unwrap();
                references.push(format!(
                    "{}/{}",
                    category.file_name().to_string_lossy(),
                    file.file_name().to_string_lossy()
                ));
            }
        }
        references.sort();
        references
    }
}

pub fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, data)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Read a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// A year the validator always accepts.
pub fn next_year() -> String {
    (chrono::Utc::now().year() + 1).to_string()
}
