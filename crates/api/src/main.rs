use std::net::SocketAddr;
use std::sync::Arc;

use avicast_api::config::{LogFormat, ServerConfig};
use avicast_api::router::build_app_router;
use avicast_api::state::AppState;
use avicast_detection::HttpDetector;
use avicast_pipeline::{ImageStore, ReviewWorkflow};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "avicast_api=debug,avicast_pipeline=debug,tower_http=debug".into());
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    tracing::info!(
        host = %config.host,
        port = %config.port,
        confidence_threshold = config.confidence_threshold,
        detection_url = %config.detection.base_url,
        "Loaded server configuration"
    );

    // --- Database ---
    let pool = avicast_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    avicast_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    avicast_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Detection adapter ---
    let detector = HttpDetector::new(&config.detection).expect("Failed to build detection client");

    // --- Workflow ---
    let workflow = ReviewWorkflow::new(
        pool.clone(),
        Arc::new(detector),
        ImageStore::new(&config.upload_dir, config.max_upload_bytes),
        config.confidence_threshold,
    )
    .with_detection_timeout(config.detection.timeout);

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        workflow: Arc::new(workflow),
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

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
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
