//! HTTP layer: router, shared state and server startup

pub mod handlers;
pub mod page;
pub mod variant;

pub use page::{escape_html, render_page, Notice, PageView};
pub use variant::{AppVariant, PageCopy};

use crate::{
    config::ServerConfig,
    error::Result,
    remover::BackgroundRemover,
    services::UploadPolicy,
    session::SessionStore,
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tracing::info;

/// Name of the cookie that carries the session id
pub const SESSION_COOKIE: &str = "bgremove_session";

/// Room for multipart boundaries and part headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub remover: Arc<dyn BackgroundRemover>,
    pub sessions: Arc<SessionStore>,
    pub config: Arc<ServerConfig>,
    pub policy: Arc<UploadPolicy>,
}

impl AppState {
    /// Build state from server settings and a remover
    #[must_use]
    pub fn new(config: ServerConfig, remover: Arc<dyn BackgroundRemover>) -> Self {
        let sessions = SessionStore::new(config.session_ttl, config.max_sessions);
        let policy = UploadPolicy::from_config(&config);
        Self {
            remover,
            sessions: Arc::new(sessions),
            config: Arc::new(config),
            policy: Arc::new(policy),
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    let body_limit = state
        .config
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/", get(handlers::index))
        .route("/upload", post(handlers::upload))
        .route("/process", post(handlers::process))
        .route("/download", get(handlers::download))
        .route("/reset", post(handlers::reset))
        .route("/healthz", get(handlers::healthz))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Bind and serve until Ctrl-C or SIGTERM
///
/// # Errors
/// - Invalid server configuration
/// - Bind or accept failures
pub async fn serve(config: ServerConfig, remover: Arc<dyn BackgroundRemover>) -> Result<()> {
    config.validate()?;
    let bind_addr = config.bind_addr;
    let variant = config.variant;
    let app = router(AppState::new(config, remover.clone()));

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|e| crate::error::BgRemovalError::file_io_error("bind", bind_addr.to_string(), &e))?;
    info!(
        address = %listener.local_addr()?,
        %variant,
        remover = %remover.describe(),
        "Serving background removal page"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
}
