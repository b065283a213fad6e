//! Wire types for the gateway's HTTP API and the live WebSocket channel.
//!
//! Audio travels as binary WebSocket frames; everything else is JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::{MeetingAnalysis, SessionStatus, Tier, TranscriptChunk};

// ============================================================
// REST: batch upload and polling
// ============================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadRequest {
    pub meeting_id: String,

    /// Complete audio payload, base64-encoded.
    pub audio: String,

    pub tier: Tier,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub meeting_id: String,

    /// Handle for the round of work this upload started.
    pub session_handle: Uuid,

    pub status: SessionStatus,

    /// Container format detected on the payload ("wav", "mp3", ...).
    pub file_format: String,

    pub tier: Tier,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub meeting_id: String,

    pub status: SessionStatus,

    /// Failure description when `status == error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Fragments buffered so far.
    pub chunks: usize,

    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptResponse {
    pub meeting_id: String,

    /// Final fragments joined with single spaces.
    pub text: String,

    pub chunks: Vec<TranscriptChunk>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub meeting_id: String,

    #[serde(flatten)]
    pub analysis: MeetingAnalysis,
}

/// Error body returned for every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================
// WebSocket: live transcription channel
// ============================================================

/// Frames the gateway sends to a live listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// One transcript fragment, pushed in buffer order.
    Delta {
        seq: u64,
        text: String,
        partial: bool,
        timestamp: DateTime<Utc>,
    },
    /// The session reached a terminal state; the gateway closes after this.
    Closed {
        status: SessionStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl From<TranscriptChunk> for ServerFrame {
    fn from(chunk: TranscriptChunk) -> Self {
        ServerFrame::Delta {
            seq: chunk.seq,
            text: chunk.text,
            partial: chunk.partial,
            timestamp: chunk.timestamp,
        }
    }
}

/// Control frames a client sends on the live channel. Audio itself rides in
/// binary frames and never appears here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// No more audio will follow; drain the engine and close with a
    /// `closed` frame once it finishes.
    End,
}
