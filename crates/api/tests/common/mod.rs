#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use avicast_api::auth::jwt::{generate_access_token, JwtConfig};
use avicast_api::config::{LogFormat, ServerConfig};
use avicast_api::router::build_app_router;
use avicast_api::state::AppState;
use avicast_db::DbPool;
use avicast_detection::{DetectorConfig, ScriptedDetector};
use avicast_pipeline::{ImageStore, ReviewWorkflow};
use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, RgbImage};
use tempfile::TempDir;
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "test-secret-that-is-long-enough-for-hmac";
const MULTIPART_BOUNDARY: &str = "avicast-test-boundary";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config(upload_dir: &str) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url: "sqlite::memory:".to_string(),
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        upload_dir: upload_dir.to_string(),
        max_upload_bytes: 1024 * 1024,
        confidence_threshold: 0.75,
        detection: DetectorConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_secs(1),
        },
        jwt: JwtConfig {
            secret: TEST_JWT_SECRET.to_string(),
            access_token_expiry_mins: 15,
        },
        log_format: LogFormat::Pretty,
    }
}

/// A router over a fresh in-memory database, a scripted detector and a
/// temporary upload directory.
pub struct TestApp {
    pub router: Router,
    pub pool: DbPool,
    pub detector: Arc<ScriptedDetector>,
    _uploads: TempDir,
}

pub async fn build_test_app(detector: ScriptedDetector) -> TestApp {
    let pool = avicast_db::create_pool("sqlite::memory:")
        .await
        .expect("in-memory pool");
    avicast_db::run_migrations(&pool)
        .await
        .expect("migrations apply");

    let uploads = tempfile::tempdir().expect("temp upload dir");
    let config = test_config(&uploads.path().to_string_lossy());
    let detector = Arc::new(detector);

    let workflow = ReviewWorkflow::new(
        pool.clone(),
        detector.clone(),
        ImageStore::new(&config.upload_dir, config.max_upload_bytes),
        config.confidence_threshold,
    );
    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config.clone()),
        workflow: Arc::new(workflow),
    };

    TestApp {
        router: build_app_router(state, &config),
        pool,
        detector,
        _uploads: uploads,
    }
}

pub fn token(user_id: i64, role: &str) -> String {
    let config = JwtConfig {
        secret: TEST_JWT_SECRET.to_string(),
        access_token_expiry_mins: 15,
    };
    generate_access_token(user_id, role, &config).expect("token generation")
}

pub async fn send(app: &TestApp, request: Request<Body>) -> Response {
    app.router.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &TestApp, uri: &str) -> Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn get_auth(app: &TestApp, uri: &str, token: &str) -> Response {
    let request = Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json_auth(
    app: &TestApp,
    uri: &str,
    token: &str,
    body: serde_json::Value,
) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn post_auth(app: &TestApp, uri: &str, token: &str) -> Response {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

/// POST a multipart upload with a `file` part and an optional `site_hint`.
pub async fn upload(
    app: &TestApp,
    token: &str,
    filename: &str,
    bytes: &[u8],
    site_hint: Option<&str>,
) -> Response {
    let mut body = Vec::new();
    if let Some(hint) = site_hint {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"site_hint\"\r\n\r\n{hint}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/images")
        .header("authorization", format!("Bearer {token}"))
        .header(
            "content-type",
            format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    send(app, request).await
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn png_bytes() -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::new(16, 12))
        .write_to(&mut out, ImageFormat::Png)
        .expect("png encodes");
    out.into_inner()
}
