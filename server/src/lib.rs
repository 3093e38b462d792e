use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{classify::ServerErrorsFailureClass, trace::TraceLayer};
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod config;
pub mod domain;
pub mod error;
pub mod file_reply;
mod handlers;
pub mod lock;
pub mod reader_stream;
pub mod resolver;
pub mod service;
pub mod sqlite;

#[cfg(test)] // <-- not needed in integration tests
extern crate rstest;

use crate::config::Config;
use crate::domain::LocalStorage;
use crate::error::StartupError;
use crate::lock::LockCoordinator;
use crate::service::ReportService;
use crate::sqlite::{Mode, Sqlite, SqliteCatalog};

/// Service wired to the SQLite catalog and local build storage.
pub type AppService = ReportService<SqliteCatalog, SqliteCatalog, LocalStorage>;

type AppState = Arc<AppService>;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::get_report_file),
    components(responses(file_reply::FileReply)),
    tags((name = "reports", description = "CI build report files"))
)]
pub struct ApiDoc;

pub async fn run() -> Result<(), StartupError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "server=debug,artifactd=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    init_catalog(&config.catalog)?;

    let socket = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(socket).await?;
    tracing::debug!("listening on {socket}");
    tracing::debug!("serving reports from {}", config.storage_dir.display());

    let app = create_routes(create_service(&config, Arc::new(LockCoordinator::new()))?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Creates the catalog schema unless the database file already exists.
pub fn init_catalog(db: &Path) -> Result<(), StartupError> {
    if !db.exists() {
        tracing::info!("creating catalog {}", db.display());
        Sqlite::open(db, Mode::ReadWrite)?.new_database()?;
    }
    Ok(())
}

/// Wires the service to the configured catalog and storage.
///
/// # Errors
///
/// Fails when the catalog cannot be opened.
pub fn create_service(
    config: &Config,
    locks: Arc<LockCoordinator>,
) -> Result<AppService, StartupError> {
    let catalog = Arc::new(SqliteCatalog::open(&config.catalog)?);
    Ok(ReportService::new(
        Arc::clone(&catalog),
        catalog,
        LocalStorage::new(config.storage_dir.clone()),
        locks,
        config.lock_timeout,
    ))
}

pub fn create_routes(service: AppService) -> Router {
    Router::new()
        .route(
            "/api/reports/:kind/:project/:build/:report",
            get(handlers::get_report_file),
        )
        .route(
            "/api/reports/:kind/:project/:build/:report/",
            get(handlers::get_report_file),
        )
        .route(
            "/api/reports/:kind/:project/:build/:report/*path",
            get(handlers::get_report_file),
        )
        .with_state(Arc::new(service))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().on_failure(
                    |error: ServerErrorsFailureClass, _latency: Duration, _span: &Span| {
                        tracing::error!("Server error: {error}");
                    },
                ))
                .into_inner(),
        )
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}
