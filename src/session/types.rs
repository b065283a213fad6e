//! Core session types: tiers, lifecycle states, transcript fragments, and
//! the per-meeting session record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::error::RelayError;

/// Capacity of the per-session event channel. Listeners that fall further
/// behind than this are disconnected and resume over replay.
pub(crate) const SESSION_EVENT_CAPACITY: usize = 1024;

/// Service level attached to a meeting. Gates feature availability, most
/// notably real-time streaming delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Basic,
    Premium,
    Enterprise,
}

impl Tier {
    /// Upload size cap for batch payloads, per the published plan limits.
    pub fn max_upload_bytes(self) -> usize {
        match self {
            Tier::Basic => 25 * 1024 * 1024,
            Tier::Premium => 100 * 1024 * 1024,
            Tier::Enterprise => 500 * 1024 * 1024,
        }
    }

    /// Only the enterprise tier may open a live transcription channel.
    pub fn allows_streaming(self) -> bool {
        matches!(self, Tier::Enterprise)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tier::Basic => "basic",
            Tier::Premium => "premium",
            Tier::Enterprise => "enterprise",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Tier {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "basic" => Ok(Tier::Basic),
            "premium" => Ok(Tier::Premium),
            "enterprise" => Ok(Tier::Enterprise),
            other => Err(RelayError::Validation(format!("unknown tier: {other}"))),
        }
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Uploading,
    Processing,
    Streaming,
    Completed,
    Cancelled,
    Error,
}

impl SessionStatus {
    /// Terminal states accept no further transitions and make the session
    /// eligible for retention sweeping.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Cancelled | SessionStatus::Error
        )
    }

    /// A round of work is in flight; a second one may not start.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionStatus::Uploading | SessionStatus::Processing | SessionStatus::Streaming
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Uploading => "uploading",
            SessionStatus::Processing => "processing",
            SessionStatus::Streaming => "streaming",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// One transcript fragment, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptChunk {
    /// Position in the session's transcript buffer, assigned at append time.
    pub seq: u64,

    pub text: String,

    /// Interim result that a later fragment may refine.
    pub partial: bool,

    pub timestamp: DateTime<Utc>,
}

/// Structured result the engine produces alongside the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingAnalysis {
    pub summary: String,

    pub key_points: Vec<String>,

    pub action_items: Vec<String>,
}

/// Event pushed to session listeners, in the exact order the registry
/// observed it.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A fragment was appended to the transcript buffer.
    Delta(TranscriptChunk),

    /// The session reached a terminal state; no further events follow.
    Closed {
        status: SessionStatus,
        error: Option<String>,
    },
}

/// Server-side record of one meeting's transcription progress and results.
///
/// Lives behind `Arc<Mutex<..>>` in the registry; every mutation happens
/// under that lock so buffer order and listener notification order agree.
#[derive(Debug)]
pub struct Session {
    pub meeting_id: String,

    /// Opaque handle issued for the current round of work. Regenerated when
    /// a finished session is resumed.
    pub handle: Uuid,

    pub tier: Tier,

    pub status: SessionStatus,

    /// Append-only fragment buffer; `TranscriptChunk::seq` is the index.
    pub transcript: Vec<TranscriptChunk>,

    /// Present only once the session completed with an engine analysis.
    pub analysis: Option<MeetingAnalysis>,

    /// Failure description when `status == error`.
    pub error: Option<String>,

    /// Container label detected on the uploaded payload ("wav", "mp3", ...).
    pub file_format: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Fan-out to live listeners. Senders hold this; receivers come from
    /// `SessionRegistry::subscribe`.
    pub(crate) events: broadcast::Sender<SessionEvent>,

    /// Ingress of the live engine stream while one is open. Shared with
    /// every attached socket so a reconnecting client keeps feeding the
    /// same stream.
    pub(crate) audio_tx: Option<mpsc::Sender<Vec<u8>>>,
}

impl Session {
    pub fn new(meeting_id: &str, tier: Tier) -> Self {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        let now = Utc::now();
        Self {
            meeting_id: meeting_id.to_string(),
            handle: Uuid::new_v4(),
            tier,
            status: SessionStatus::Idle,
            transcript: Vec::new(),
            analysis: None,
            error: None,
            file_format: None,
            created_at: now,
            updated_at: now,
            events,
            audio_tx: None,
        }
    }

    /// Full transcript text: final fragments joined with a single space.
    pub fn full_text(&self) -> String {
        self.transcript
            .iter()
            .filter(|c| !c.partial)
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Number of sockets currently receiving this session's event feed.
    pub(crate) fn listeners(&self) -> usize {
        self.events.receiver_count()
    }

    /// Arm a new round of work. A finished session starts over with a fresh
    /// handle and an empty buffer; an idle one just transitions.
    pub(crate) fn begin_round(&mut self, tier: Tier, status: SessionStatus) {
        if self.status.is_terminal() {
            self.transcript.clear();
            self.analysis = None;
            self.error = None;
            self.handle = Uuid::new_v4();
        }
        self.tier = tier;
        self.status = status;
        self.touch();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            meeting_id: self.meeting_id.clone(),
            handle: self.handle,
            tier: self.tier,
            status: self.status,
            chunks: self.transcript.len(),
            analysis: self.analysis.clone(),
            error: self.error.clone(),
            file_format: self.file_format.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Point-in-time copy of a session's observable state, safe to hand out
/// without holding the registry locks.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub meeting_id: String,

    pub handle: Uuid,

    pub tier: Tier,

    pub status: SessionStatus,

    /// Number of fragments in the transcript buffer.
    pub chunks: usize,

    pub analysis: Option<MeetingAnalysis>,

    pub error: Option<String>,

    pub file_format: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_parsing_and_limits() {
        assert_eq!("basic".parse::<Tier>().unwrap(), Tier::Basic);
        assert_eq!("ENTERPRISE".parse::<Tier>().unwrap(), Tier::Enterprise);
        assert!("gold".parse::<Tier>().is_err());

        assert_eq!(Tier::Basic.max_upload_bytes(), 25 * 1024 * 1024);
        assert_eq!(Tier::Premium.max_upload_bytes(), 100 * 1024 * 1024);
        assert_eq!(Tier::Enterprise.max_upload_bytes(), 500 * 1024 * 1024);

        assert!(!Tier::Basic.allows_streaming());
        assert!(!Tier::Premium.allows_streaming());
        assert!(Tier::Enterprise.allows_streaming());
    }

    #[test]
    fn test_status_classification() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
        assert!(SessionStatus::Error.is_terminal());
        assert!(!SessionStatus::Processing.is_terminal());

        assert!(SessionStatus::Uploading.is_active());
        assert!(SessionStatus::Streaming.is_active());
        assert!(!SessionStatus::Idle.is_active());
        assert!(!SessionStatus::Completed.is_active());
    }

    #[test]
    fn test_full_text_joins_final_fragments_with_spaces() {
        let mut session = Session::new("m1", Tier::Enterprise);
        for (i, text) in ["a", "b", "c"].iter().enumerate() {
            session.transcript.push(TranscriptChunk {
                seq: i as u64,
                text: text.to_string(),
                partial: false,
                timestamp: Utc::now(),
            });
        }
        // An interim fragment does not show up in the joined text.
        session.transcript.push(TranscriptChunk {
            seq: 3,
            text: "d?".into(),
            partial: true,
            timestamp: Utc::now(),
        });
        assert_eq!(session.full_text(), "a b c");
    }

    #[test]
    fn test_serde_names_are_lowercase() {
        assert_eq!(serde_json::to_string(&Tier::Enterprise).unwrap(), "\"enterprise\"");
        assert_eq!(
            serde_json::to_string(&SessionStatus::Processing).unwrap(),
            "\"processing\""
        );
    }
}
