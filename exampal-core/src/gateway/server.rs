//! HTTP gateway server built on axum.

use axum::extract::{DefaultBodyLimit, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::api;
use crate::assistant::StudyAssistant;
use crate::config::{ExamPalConfig, ServerConfig};
use crate::history::SessionStore;

/// Thread-safe shared gateway reference for axum handlers.
pub type SharedGateway = Arc<GatewayState>;

/// Everything the handlers share: the assistant, per-session chat logs and
/// the server settings.
pub struct GatewayState {
    assistant: StudyAssistant,
    sessions: SessionStore,
    config: ServerConfig,
    started_at: DateTime<Utc>,
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("config", &self.config)
            .field("model", &self.assistant.brain().model_name())
            .field("started_at", &self.started_at)
            .finish()
    }
}

impl GatewayState {
    pub fn new(assistant: StudyAssistant, sessions: SessionStore, config: ServerConfig) -> Self {
        Self {
            assistant,
            sessions,
            config,
            started_at: Utc::now(),
        }
    }

    /// Build the full state (remote provider, extraction, sessions) from
    /// configuration.
    pub fn from_config(config: &ExamPalConfig) -> Self {
        Self::new(
            StudyAssistant::from_config(config),
            SessionStore::from_config(&config.chat),
            config.server.clone(),
        )
    }

    pub fn assistant(&self) -> &StudyAssistant {
        &self.assistant
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

/// Build the axum Router: `/api/*`, `/health`, and the optional static
/// frontend as a fallback.
pub fn router(shared: SharedGateway) -> Router {
    let api_routes = Router::new()
        .route("/upload", post(api::upload))
        .route("/files", get(api::list_files))
        .route("/delete-file", post(api::delete_file))
        .route("/generate-plan", post(api::generate_plan))
        .route("/chat", post(api::chat))
        .route("/chat-history", get(api::chat_history))
        .route("/reset-chat", post(api::reset_chat));

    let mut app = Router::new()
        .nest("/api", api_routes)
        .route("/health", get(health_handler));
    if let Some(dir) = &shared.config.static_dir {
        app = app.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true));
    }

    app.layer(DefaultBodyLimit::max(shared.config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Health check endpoint.
async fn health_handler(State(gw): State<SharedGateway>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "model": gw.assistant.brain().model_name(),
        "sessions": gw.sessions.len().await,
        "uptime_secs": gw.uptime_secs(),
    }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

/// Create the upload directory and serve until Ctrl-C.
pub async fn run(gw: SharedGateway) -> crate::Result<()> {
    gw.assistant.store().ensure_dir().await?;

    let addr = format!("{}:{}", gw.config.host, gw.config.port);
    let upload_dir = gw.assistant.store().root().display().to_string();
    let app = router(gw);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, upload_dir = %upload_dir, "Exam Pal listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
