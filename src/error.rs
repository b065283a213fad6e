//! Error taxonomy shared by the gateway, the session registry, and the
//! session client.
//!
//! Validation and authorization failures surface synchronously at the call
//! site. Engine-side failures that happen after a request has returned are
//! recorded on the session (`status = error`) and surface on the next poll or
//! delivery attempt.

use crate::session::Tier;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Malformed or missing input (empty meeting id, undecodable payload).
    #[error("{0}")]
    Validation(String),

    /// Missing credential, or the identity collaborator rejected it.
    #[error("missing or invalid credential")]
    Unauthorized,

    /// Streaming requested on a tier that does not include it (server side).
    #[error("{0}")]
    TierNotAllowed(String),

    /// Streaming delivery requested locally on a non-enterprise tier; no
    /// network activity has happened when this is raised.
    #[error("streaming delivery requires the enterprise tier, not {0}")]
    InvalidTier(Tier),

    /// No session exists for the meeting id.
    #[error("{0}")]
    NotFound(String),

    /// Result requested before the session reached `completed`.
    #[error("{0}")]
    NotReady(String),

    /// Streaming reconnect attempts exhausted.
    #[error("connection lost after {attempts} reconnect attempts")]
    ConnectionLost { attempts: u32 },

    /// The engine produced nothing within the processing bound.
    #[error("{0}")]
    Timeout(String),

    /// The external transcription engine reported failure.
    #[error("{0}")]
    Engine(String),
}

impl RelayError {
    pub fn not_found(meeting_id: &str) -> Self {
        Self::NotFound(format!("no transcription session for meeting {meeting_id}"))
    }

    pub fn tier_not_allowed(tier: Tier) -> Self {
        Self::TierNotAllowed(format!(
            "live transcription requires the enterprise tier, got {tier}"
        ))
    }

    pub fn timeout(secs: u64) -> Self {
        Self::Timeout(format!("no transcription result within {secs}s"))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Validation(_) | RelayError::InvalidTier(_) => StatusCode::BAD_REQUEST,
            RelayError::Unauthorized => StatusCode::UNAUTHORIZED,
            RelayError::TierNotAllowed(_) => StatusCode::FORBIDDEN,
            RelayError::NotFound(_) => StatusCode::NOT_FOUND,
            RelayError::NotReady(_) => StatusCode::CONFLICT,
            RelayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Engine(_) | RelayError::ConnectionLost { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Rebuild the error a gateway response carried, from its status code and
    /// `{"error": message}` body. Used by the client-side REST transport.
    pub fn from_response(status: u16, message: String) -> Self {
        match status {
            400 => RelayError::Validation(message),
            401 => RelayError::Unauthorized,
            403 => RelayError::TierNotAllowed(message),
            404 => RelayError::NotFound(message),
            409 => RelayError::NotReady(message),
            504 => RelayError::Timeout(message),
            _ => RelayError::Engine(message),
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.to_string() }));
        (self.status_code(), body).into_response()
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
