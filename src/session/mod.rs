//! Per-meeting transcription sessions
//!
//! This module provides the session registry and its record types:
//! - Session lifecycle (idle, uploading, processing, streaming, terminal)
//! - Append-only transcript buffering with ordered listener fan-out
//! - Tier definitions and their feature gates
//! - Retention sweeping of finished and abandoned sessions

mod registry;
mod types;

pub use registry::{SessionRegistry, StreamAttach, StreamStart, StreamSubscription};
pub(crate) use types::SESSION_EVENT_CAPACITY;
pub use types::{
    MeetingAnalysis, Session, SessionEvent, SessionSnapshot, SessionStatus, Tier, TranscriptChunk,
};
