#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use bookmeta_api::config::ServerConfig;
use bookmeta_api::engine::{EngineSettings, JobManager};
use bookmeta_api::router::build_app_router;
use bookmeta_api::state::AppState;
use bookmeta_core::sites::Site;
use bookmeta_pipeline::llm::{Completion, LlmError, MetadataModel, TokenUsage};
use bookmeta_pipeline::scrape::{PageContent, PageSource, ScrapeError};
use bookmeta_pipeline::store::CsvBookStore;
use bookmeta_pipeline::BookWorkflow;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

/// ISBNs starting with this prefix are unknown to every retailer.
pub const MISSING_PREFIX: &str = "000";

/// Build a test `ServerConfig` with safe defaults.
///
/// Jobs run without a pause between chunks; the CSV store lives in `dir`.
pub fn test_config(dir: &TempDir) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        csv_file_path: dir.path().join("ai_responses.csv"),
        default_chunk_size: 2,
        max_sync_batch: 3,
        chunk_delay_ms: 0,
        job_retention_hours: 24,
        job_sweep_interval_secs: 3_600,
        max_upload_bytes: 1024 * 1024,
    }
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Serves `Book page for ISBN <isbn>` for every ISBN except the missing ones.
pub struct FakePages;

#[async_trait]
impl PageSource for FakePages {
    async fn fetch(&self, isbn: &str, site: &Site) -> Result<PageContent, ScrapeError> {
        if isbn.starts_with(MISSING_PREFIX) {
            return Err(ScrapeError::Status {
                site: site.name.to_string(),
                status: 404,
            });
        }
        Ok(PageContent {
            isbn: isbn.to_string(),
            found: true,
            text: format!("Book page for ISBN {isbn} by Umberto Eco"),
            source: site.name.to_string(),
            site_id: site.id.to_string(),
            duration_ms: 1,
        })
    }
}

/// [`FakePages`] behind a fixed delay per fetch.
pub struct SlowPages {
    pub delay: Duration,
}

#[async_trait]
impl PageSource for SlowPages {
    async fn fetch(&self, isbn: &str, site: &Site) -> Result<PageContent, ScrapeError> {
        tokio::time::sleep(self.delay).await;
        FakePages.fetch(isbn, site).await
    }
}

/// Echoes the ISBN found in the prompt back as a metadata object.
///
/// A prompt without an ISBN gets a plain-text reply.
#[derive(Default)]
pub struct FakeModel {
    pub calls: AtomicUsize,
}

#[async_trait]
impl MetadataModel for FakeModel {
    async fn complete(&self, prompt: &str) -> Result<Completion, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let isbn = prompt
            .split_once("ISBN ")
            .and_then(|(_, rest)| rest.split_whitespace().next());
        let text = match isbn {
            Some(isbn) => format!(
                "```json\n{{\"title\": \"Il nome della rosa\", \"author\": \"Umberto Eco\", \"isbn\": \"{isbn}\"}}\n```"
            ),
            None => "I cannot help with that".to_string(),
        };
        Ok(Completion {
            text,
            usage: Some(TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
        })
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// A router over fakes plus handles to inspect its state.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub model: Arc<FakeModel>,
    /// Keeps the CSV store directory alive.
    pub dir: TempDir,
}

impl TestApp {
    pub fn csv_path(&self) -> PathBuf {
        self.state.config.csv_file_path.clone()
    }
}

/// Build the full application router with all middleware layers, backed by
/// fake retailers, a fake model and a CSV store in a temporary directory.
pub fn build_test_app() -> TestApp {
    build_test_app_with(Arc::new(FakePages), |_| {})
}

/// [`build_test_app`] with a custom page source and config overrides.
pub fn build_test_app_with(
    pages: Arc<dyn PageSource>,
    configure: impl FnOnce(&mut ServerConfig),
) -> TestApp {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(&dir);
    configure(&mut config);

    let model = Arc::new(FakeModel::default());
    let books = Arc::new(CsvBookStore::new(config.csv_file_path.clone()));
    let workflow = Arc::new(BookWorkflow::new(
        pages,
        Arc::clone(&model) as _,
        Arc::clone(&books) as _,
    ));
    let jobs = Arc::new(JobManager::new(
        Arc::clone(&workflow) as _,
        EngineSettings {
            chunk_delay: config.chunk_delay(),
            retention: config.job_retention(),
        },
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        jobs,
        workflow,
        books,
    };
    let router = build_app_router(state.clone(), &config);

    TestApp {
        router,
        state,
        model,
        dir,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    app.oneshot(
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub const MULTIPART_BOUNDARY: &str = "bookmeta-test-boundary";

/// POST a multipart form with one file field.
pub async fn post_csv(app: Router, uri: &str, field: &str, filename: &str, csv: &str) -> Response {
    let body = format!(
        "--{MULTIPART_BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
         Content-Type: text/csv\r\n\r\n\
         {csv}\r\n\
         --{MULTIPART_BOUNDARY}--\r\n"
    );
    app.oneshot(
        Request::post(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Poll `GET /api/v1/jobs/{id}` until the job is terminal and return its body.
pub async fn wait_for_job(app: &Router, job_id: &str) -> serde_json::Value {
    let uri = format!("/api/v1/jobs/{job_id}");
    for _ in 0..200 {
        let response = get(app.clone(), &uri).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let status = json["data"]["status"].as_str().unwrap_or_default().to_string();
        if matches!(status.as_str(), "completed" | "failed" | "cancelled") {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish in time");
}
