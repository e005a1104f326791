use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tower_cookies::CookieManagerLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::api::{self, AppState, SharedState};
use super::db::{CrmDb, DbHandle};
use super::mailer;
use super::ws;
use crate::config::CrmConfig;

/// Build the full application router: API routes, the live socket, cookie
/// handling and request tracing.
pub fn build_router(state: SharedState) -> Router {
    let dev_mode = state.config.server.dev_mode;
    let mut app = api::api_router()
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(CookieManagerLayer::new())
        .layer(TraceLayer::new_for_http());

    if dev_mode {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Open the database, making its directory if needed.
pub fn open_database(config: &CrmConfig) -> Result<CrmDb> {
    let path = &config.database.path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    CrmDb::new(path)
        .with_context(|| format!("Failed to initialize CRM database at {}", path.display()))
}

/// Start the CRM server and run until Ctrl+C.
pub async fn start_server(config: CrmConfig) -> Result<()> {
    let db = open_database(&config)?;
    let purged = db.purge_expired_sessions()?;
    if purged > 0 {
        info!(purged, "Removed expired sessions");
    }

    let mailer = mailer::from_config(&config.mail);
    let addr = config.bind_addr();
    let state = Arc::new(AppState::new(DbHandle::new(db), mailer, config));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, "CRM server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::mailer::MemoryMailer;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    fn state(dev_mode: bool) -> SharedState {
        let mut config = CrmConfig::default();
        config.server.dev_mode = dev_mode;
        let db = DbHandle::new(CrmDb::new_in_memory().unwrap());
        Arc::new(AppState::new(db, Arc::new(MemoryMailer::new()), config))
    }

    #[tokio::test]
    async fn test_dev_mode_adds_cors_headers() {
        let request = || {
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "http://localhost:5173")
                .body(Body::empty())
                .unwrap()
        };

        let response = build_router(state(true)).oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response
                .headers()
                .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        );

        let response = build_router(state(false)).oneshot(request()).await.unwrap();
        assert!(
            !response
                .headers()
                .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        );
    }

    #[tokio::test]
    async fn test_ws_requires_session() {
        let request = Request::builder()
            .uri("/ws")
            .body(Body::empty())
            .unwrap();
        let response = build_router(state(false)).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_open_database_creates_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = CrmConfig::default();
        config.database.path = dir.path().join("nested/crm.db");
        open_database(&config).unwrap();
        assert!(config.database.path.exists());
    }
}
