//! Transcription gateway
//!
//! This module provides the relay's HTTP surface:
//! - POST /v1/transcription/upload - Batch upload for a meeting
//! - GET /v1/transcription/:id/status - Poll session state
//! - GET /v1/transcription/:id/transcript - Full transcript once completed
//! - GET /v1/transcription/:id/analysis - Structured analysis once completed
//! - GET /v1/transcription/live/:id - Live WebSocket channel (enterprise)
//! - GET /health - Health check
//!
//! Handlers stay thin: session state lives in the registry, engine access
//! goes through the `TranscriptionEngine` seam, and credentials go through
//! `IdentityProvider`.

mod handlers;
mod routes;
mod state;
mod stream;

pub use routes::create_router;
pub use state::AppState;
