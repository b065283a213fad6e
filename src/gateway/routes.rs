use super::handlers;
use super::state::AppState;
use super::stream;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Request body cap: the largest tier's upload plus base64 overhead.
const MAX_BODY_BYTES: usize = 768 * 1024 * 1024;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Batch: upload once, poll until done
        .route("/v1/transcription/upload", post(handlers::upload))
        .route(
            "/v1/transcription/:meeting_id/status",
            get(handlers::get_status),
        )
        .route(
            "/v1/transcription/:meeting_id/transcript",
            get(handlers::get_transcript),
        )
        .route(
            "/v1/transcription/:meeting_id/analysis",
            get(handlers::get_analysis),
        )
        // Live delivery over WebSocket
        .route(
            "/v1/transcription/live/:meeting_id",
            get(stream::live_transcription),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        // Request logging plus browser access for the web client
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
