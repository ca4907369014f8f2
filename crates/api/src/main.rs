use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bookmeta_api::background;
use bookmeta_api::config::ServerConfig;
use bookmeta_api::engine::{EngineSettings, JobManager};
use bookmeta_api::router::build_app_router;
use bookmeta_api::state::AppState;
use bookmeta_pipeline::llm::{LlmConfig, OpenRouterClient};
use bookmeta_pipeline::scrape::{HttpPageSource, ScrapeConfig};
use bookmeta_pipeline::store::CsvBookStore;
use bookmeta_pipeline::BookWorkflow;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "bookmeta_api=debug,bookmeta_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Pipeline collaborators ---
    let pages = HttpPageSource::new(&ScrapeConfig::from_env())
        .expect("Failed to build scraping HTTP client");

    let llm_config = LlmConfig::from_env();
    if llm_config.api_key.is_none() {
        tracing::warn!("OPENROUTER_API_KEY not set; AI processing will fail until it is configured");
    }
    let model = OpenRouterClient::new(llm_config).expect("Failed to build model HTTP client");
    tracing::info!(model = model.model(), "Language model client ready");

    let books = Arc::new(CsvBookStore::new(config.csv_file_path.clone()));
    tracing::info!(path = %books.path().display(), "Book store ready");

    let workflow = Arc::new(BookWorkflow::new(
        Arc::new(pages),
        Arc::new(model),
        Arc::clone(&books) as _,
    ));

    // --- Job engine ---
    let jobs = Arc::new(JobManager::new(
        Arc::clone(&workflow) as _,
        EngineSettings {
            chunk_delay: config.chunk_delay(),
            retention: config.job_retention(),
        },
    ));

    // Spawn job retention (evicts finished jobs past the retention window).
    let retention_cancel = tokio_util::sync::CancellationToken::new();
    let retention_handle = tokio::spawn(background::job_retention::run(
        Arc::clone(&jobs),
        config.job_sweep_interval(),
        retention_cancel.clone(),
    ));

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        jobs: Arc::clone(&jobs),
        workflow,
        books,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    retention_cancel.cancel();
    let _ = tokio::time::timeout(config.shutdown_timeout(), retention_handle).await;
    tracing::info!("Job retention task stopped");

    let active = jobs.active_jobs().await;
    if active > 0 {
        tracing::warn!(active, "Shutting down with jobs still in progress; their state is lost");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
