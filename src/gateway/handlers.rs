use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use base64::Engine as _;
use tracing::{error, info};

use super::state::AppState;
use crate::audio;
use crate::auth::Principal;
use crate::error::{RelayError, RelayResult};
use crate::protocol::{
    AnalysisResponse, StatusResponse, TranscriptResponse, UploadRequest, UploadResponse,
};
use crate::session::SessionStatus;

// ============================================================================
// Authorization
// ============================================================================

/// Pull the bearer credential out of the Authorization header.
pub(super) fn bearer_token(headers: &HeaderMap) -> RelayResult<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(RelayError::Unauthorized)
}

pub(super) async fn authorize(state: &AppState, headers: &HeaderMap) -> RelayResult<Principal> {
    let token = bearer_token(headers)?;
    state.identity.authenticate(token).await
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/transcription/upload
/// Accept a complete audio payload and start a batch round for the meeting
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<UploadRequest>,
) -> RelayResult<Json<UploadResponse>> {
    authorize(&state, &headers).await?;

    let meeting_id = req.meeting_id.trim().to_string();
    if meeting_id.is_empty() {
        return Err(RelayError::Validation(
            "meeting id must not be empty".to_string(),
        ));
    }

    let audio = base64::engine::general_purpose::STANDARD
        .decode(req.audio.as_bytes())
        .map_err(|_| RelayError::Validation("audio payload is not valid base64".to_string()))?;
    if audio.is_empty() {
        return Err(RelayError::Validation(
            "audio payload must not be empty".to_string(),
        ));
    }
    let limit = req.tier.max_upload_bytes();
    if audio.len() > limit {
        return Err(RelayError::Validation(format!(
            "payload of {} bytes exceeds the {} tier limit of {} bytes",
            audio.len(),
            req.tier,
            limit
        )));
    }

    // Probe before touching the registry; a bad payload leaves no session.
    let file_format = audio::detect_format(&audio)?;

    let handle = state
        .registry
        .begin_upload(&meeting_id, req.tier, &file_format)
        .await?;
    state.registry.mark_processing(&meeting_id).await?;

    info!(
        "Accepted {} byte {} upload for meeting {} (tier: {})",
        audio.len(),
        file_format,
        meeting_id,
        req.tier
    );

    // Engine dispatch runs detached; the outcome lands on the session and
    // surfaces through polling.
    let registry = state.registry.clone();
    let engine = state.engine.clone();
    let processing_timeout = state.processing_timeout;
    let tier = req.tier;
    let id = meeting_id.clone();
    tokio::spawn(async move {
        match tokio::time::timeout(processing_timeout, engine.transcribe(&id, &audio, tier)).await
        {
            Ok(Ok(batch)) => {
                if !batch.transcript.is_empty() {
                    if let Err(e) = registry.append_chunk(&id, &batch.transcript, false).await {
                        error!("Failed to buffer transcript for {}: {}", id, e);
                    }
                }
                if let Err(e) = registry.complete(&id, Some(batch.analysis)).await {
                    error!("Failed to record result for {}: {}", id, e);
                }
            }
            Ok(Err(e)) => {
                let _ = registry.fail(&id, &e.to_string()).await;
            }
            Err(_) => {
                let message = RelayError::timeout(processing_timeout.as_secs()).to_string();
                let _ = registry.fail(&id, &message).await;
            }
        }
    });

    Ok(Json(UploadResponse {
        meeting_id,
        session_handle: handle,
        status: SessionStatus::Processing,
        file_format,
        tier: req.tier,
    }))
}

/// GET /v1/transcription/:meeting_id/status
/// Poll the state of a transcription session
pub async fn get_status(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
    headers: HeaderMap,
) -> RelayResult<Json<StatusResponse>> {
    authorize(&state, &headers).await?;

    let snapshot = state.registry.snapshot(&meeting_id).await?;
    Ok(Json(StatusResponse {
        meeting_id: snapshot.meeting_id,
        status: snapshot.status,
        error: snapshot.error,
        chunks: snapshot.chunks,
        updated_at: snapshot.updated_at,
    }))
}

/// GET /v1/transcription/:meeting_id/transcript
/// Full transcript of a completed session
pub async fn get_transcript(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
    headers: HeaderMap,
) -> RelayResult<Json<TranscriptResponse>> {
    authorize(&state, &headers).await?;

    let (text, chunks) = state.registry.transcript(&meeting_id).await?;
    Ok(Json(TranscriptResponse {
        meeting_id,
        text,
        chunks,
    }))
}

/// GET /v1/transcription/:meeting_id/analysis
/// Structured analysis of a completed session
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
    headers: HeaderMap,
) -> RelayResult<Json<AnalysisResponse>> {
    authorize(&state, &headers).await?;

    let analysis = state.registry.analysis(&meeting_id).await?;
    Ok(Json(AnalysisResponse {
        meeting_id,
        analysis,
    }))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
