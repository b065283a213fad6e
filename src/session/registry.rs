//! Session registry: the single source of truth for per-meeting transcription
//! state.
//!
//! Sessions are keyed by meeting id. The map itself sits behind an async
//! `RwLock`; each session sits behind its own `Mutex` so work on one meeting
//! never blocks another. Transcript appends and listener notification happen
//! under the same session lock, which is what keeps delivery order identical
//! to buffer order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{RelayError, RelayResult};
use crate::session::types::{
    MeetingAnalysis, Session, SessionEvent, SessionSnapshot, SessionStatus, Tier, TranscriptChunk,
};

/// Outcome of asking to attach to a live stream for a meeting.
#[derive(Debug)]
pub enum StreamAttach {
    /// An engine stream is live; feed audio through the shared ingress.
    Live {
        handle: Uuid,
        ingress: mpsc::Sender<Vec<u8>>,
    },
    /// The session exists but accepts no more audio (input released or
    /// already terminal); serve replay and the closing event only.
    Observe { handle: Uuid },
    /// No round is running; open an engine stream and call `start_stream`.
    NeedsEngine,
}

/// Outcome of installing a freshly opened engine stream.
#[derive(Debug)]
pub enum StreamStart {
    /// The provided ingress was installed; the caller owns the engine relay.
    Started { handle: Uuid },
    /// Another connection won the race; use the session's existing state and
    /// drop the engine stream that was opened for this call.
    Raced {
        handle: Uuid,
        ingress: Option<mpsc::Sender<Vec<u8>>>,
    },
}

/// Live subscription to a session: buffered replay plus the event feed.
pub struct StreamSubscription {
    /// Fragments already buffered at or after the requested sequence.
    pub replay: Vec<TranscriptChunk>,

    /// Events appended after this subscription was taken.
    pub events: broadcast::Receiver<SessionEvent>,

    /// Session status at subscription time.
    pub status: SessionStatus,

    /// Failure description when the session already errored.
    pub error: Option<String>,

    /// Sequence the first live event will carry.
    pub next_seq: u64,
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,

    /// How long terminal sessions stay queryable before the sweeper drops
    /// them. Doubles as the reconnect grace for a streaming session whose
    /// socket was lost.
    retention: Duration,
}

impl SessionRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            retention,
        }
    }

    async fn slot(&self, meeting_id: &str) -> RelayResult<Arc<Mutex<Session>>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(meeting_id)
            .cloned()
            .ok_or_else(|| RelayError::not_found(meeting_id))
    }

    async fn slot_or_create(&self, meeting_id: &str, tier: Tier) -> Arc<Mutex<Session>> {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(meeting_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Session::new(meeting_id, tier))))
            .clone()
    }

    // ============================================================
    // Lifecycle
    // ============================================================

    /// Start a batch round for a meeting, creating the session if needed.
    /// Fails if any round is already in flight. A finished session starts
    /// over with a fresh handle and an empty buffer.
    pub async fn begin_upload(
        &self,
        meeting_id: &str,
        tier: Tier,
        file_format: &str,
    ) -> RelayResult<Uuid> {
        let slot = self.slot_or_create(meeting_id, tier).await;
        let mut session = slot.lock().await;
        if session.status.is_active() {
            return Err(RelayError::Validation(format!(
                "a transcription round is already in progress for meeting {meeting_id}"
            )));
        }
        session.begin_round(tier, SessionStatus::Uploading);
        session.file_format = Some(file_format.to_string());
        info!(
            "Session {} started batch round (tier: {}, format: {})",
            meeting_id, tier, file_format
        );
        Ok(session.handle)
    }

    /// Move an uploading session to `processing` once its payload has been
    /// handed to the engine dispatch task.
    pub async fn mark_processing(&self, meeting_id: &str) -> RelayResult<()> {
        let slot = self.slot(meeting_id).await?;
        let mut session = slot.lock().await;
        if session.status == SessionStatus::Uploading {
            session.status = SessionStatus::Processing;
            session.touch();
        }
        Ok(())
    }

    /// Attach to a meeting's live stream without opening a new engine stream.
    /// The tier gate runs before anything is created, so a rejected call
    /// leaves no session behind.
    pub async fn attach_stream(&self, meeting_id: &str, tier: Tier) -> RelayResult<StreamAttach> {
        if !tier.allows_streaming() {
            return Err(RelayError::tier_not_allowed(tier));
        }
        let slot = {
            let sessions = self.sessions.read().await;
            match sessions.get(meeting_id) {
                Some(slot) => slot.clone(),
                None => return Ok(StreamAttach::NeedsEngine),
            }
        };
        let session = slot.lock().await;
        match session.status {
            SessionStatus::Streaming => match &session.audio_tx {
                Some(tx) => Ok(StreamAttach::Live {
                    handle: session.handle,
                    ingress: tx.clone(),
                }),
                None => Ok(StreamAttach::Observe {
                    handle: session.handle,
                }),
            },
            SessionStatus::Uploading | SessionStatus::Processing => {
                Err(RelayError::Validation(format!(
                    "a batch round is already in progress for meeting {meeting_id}"
                )))
            }
            SessionStatus::Idle => Ok(StreamAttach::NeedsEngine),
            _ => Ok(StreamAttach::Observe {
                handle: session.handle,
            }),
        }
    }

    /// Install a freshly opened engine stream and start a streaming round.
    /// If another connection installed one first, the caller gets the
    /// existing state back instead.
    pub async fn start_stream(
        &self,
        meeting_id: &str,
        tier: Tier,
        ingress: mpsc::Sender<Vec<u8>>,
    ) -> RelayResult<StreamStart> {
        if !tier.allows_streaming() {
            return Err(RelayError::tier_not_allowed(tier));
        }
        let slot = self.slot_or_create(meeting_id, tier).await;
        let mut session = slot.lock().await;
        match session.status {
            SessionStatus::Streaming => Ok(StreamStart::Raced {
                handle: session.handle,
                ingress: session.audio_tx.clone(),
            }),
            SessionStatus::Uploading | SessionStatus::Processing => {
                Err(RelayError::Validation(format!(
                    "a batch round is already in progress for meeting {meeting_id}"
                )))
            }
            _ => {
                session.begin_round(tier, SessionStatus::Streaming);
                session.audio_tx = Some(ingress);
                info!("Session {} started streaming round", meeting_id);
                Ok(StreamStart::Started {
                    handle: session.handle,
                })
            }
        }
    }

    /// Drop the session's hold on the engine ingress. Once every attached
    /// socket drops its clone as well, the engine sees end of audio.
    pub async fn release_ingress(&self, meeting_id: &str) -> RelayResult<()> {
        let slot = self.slot(meeting_id).await?;
        let mut session = slot.lock().await;
        session.audio_tx = None;
        session.touch();
        Ok(())
    }

    // ============================================================
    // Transcript buffer
    // ============================================================

    /// Append one fragment and notify listeners, both under the session
    /// lock. Returns `None` when the session is already terminal; late
    /// engine output after a cancel is dropped, not buffered.
    pub async fn append_chunk(
        &self,
        meeting_id: &str,
        text: &str,
        partial: bool,
    ) -> RelayResult<Option<TranscriptChunk>> {
        let slot = self.slot(meeting_id).await?;
        let mut session = slot.lock().await;
        if session.status.is_terminal() {
            return Ok(None);
        }
        let chunk = TranscriptChunk {
            seq: session.transcript.len() as u64,
            text: text.to_string(),
            partial,
            timestamp: Utc::now(),
        };
        session.transcript.push(chunk.clone());
        session.touch();
        // Listeners lagging past the channel capacity are disconnected and
        // recover through replay.
        let _ = session.events.send(SessionEvent::Delta(chunk.clone()));
        Ok(Some(chunk))
    }

    /// Subscribe to a session's event feed, replaying buffered fragments
    /// from `from_seq`. Replay extraction and subscription happen under one
    /// lock acquisition, so the feed picks up exactly where replay ends.
    pub async fn subscribe(
        &self,
        meeting_id: &str,
        from_seq: u64,
    ) -> RelayResult<StreamSubscription> {
        let slot = self.slot(meeting_id).await?;
        let session = slot.lock().await;
        let start = (from_seq as usize).min(session.transcript.len());
        Ok(StreamSubscription {
            replay: session.transcript[start..].to_vec(),
            events: session.events.subscribe(),
            status: session.status,
            error: session.error.clone(),
            next_seq: session.transcript.len() as u64,
        })
    }

    // ============================================================
    // Terminal transitions
    // ============================================================

    /// Mark a session completed and store the analysis, if the engine
    /// produced one. No-op when the session already reached a terminal
    /// state.
    pub async fn complete(
        &self,
        meeting_id: &str,
        analysis: Option<MeetingAnalysis>,
    ) -> RelayResult<()> {
        let slot = self.slot(meeting_id).await?;
        let mut session = slot.lock().await;
        if session.status.is_terminal() {
            return Ok(());
        }
        session.status = SessionStatus::Completed;
        session.analysis = analysis;
        session.audio_tx = None;
        session.touch();
        let _ = session.events.send(SessionEvent::Closed {
            status: SessionStatus::Completed,
            error: None,
        });
        info!(
            "Session {} completed with {} transcript fragments",
            meeting_id,
            session.transcript.len()
        );
        Ok(())
    }

    /// Record an engine or timeout failure. No-op when already terminal.
    pub async fn fail(&self, meeting_id: &str, message: &str) -> RelayResult<()> {
        let slot = self.slot(meeting_id).await?;
        let mut session = slot.lock().await;
        if session.status.is_terminal() {
            return Ok(());
        }
        session.status = SessionStatus::Error;
        session.error = Some(message.to_string());
        session.audio_tx = None;
        session.touch();
        let _ = session.events.send(SessionEvent::Closed {
            status: SessionStatus::Error,
            error: Some(message.to_string()),
        });
        info!("Session {} failed: {}", meeting_id, message);
        Ok(())
    }

    /// Client-initiated stop. Returns false when the session had already
    /// finished, in which case its result stands.
    pub async fn cancel(&self, meeting_id: &str) -> RelayResult<bool> {
        let slot = self.slot(meeting_id).await?;
        let mut session = slot.lock().await;
        if session.status.is_terminal() {
            return Ok(false);
        }
        session.status = SessionStatus::Cancelled;
        session.audio_tx = None;
        session.touch();
        let _ = session.events.send(SessionEvent::Closed {
            status: SessionStatus::Cancelled,
            error: None,
        });
        info!("Session {} cancelled", meeting_id);
        Ok(true)
    }

    // ============================================================
    // Reads
    // ============================================================

    pub async fn snapshot(&self, meeting_id: &str) -> RelayResult<SessionSnapshot> {
        let slot = self.slot(meeting_id).await?;
        let session = slot.lock().await;
        Ok(session.snapshot())
    }

    /// Full transcript for a completed session: joined text plus the raw
    /// fragments.
    pub async fn transcript(
        &self,
        meeting_id: &str,
    ) -> RelayResult<(String, Vec<TranscriptChunk>)> {
        let slot = self.slot(meeting_id).await?;
        let session = slot.lock().await;
        if session.status != SessionStatus::Completed {
            return Err(RelayError::NotReady(format!(
                "transcription for meeting {meeting_id} is {}, not completed",
                session.status
            )));
        }
        Ok((session.full_text(), session.transcript.clone()))
    }

    pub async fn analysis(&self, meeting_id: &str) -> RelayResult<MeetingAnalysis> {
        let slot = self.slot(meeting_id).await?;
        let session = slot.lock().await;
        if session.status != SessionStatus::Completed {
            return Err(RelayError::NotReady(format!(
                "transcription for meeting {meeting_id} is {}, not completed",
                session.status
            )));
        }
        session.analysis.clone().ok_or_else(|| {
            RelayError::NotReady(format!(
                "no analysis was produced for meeting {meeting_id}"
            ))
        })
    }

    // ============================================================
    // Retention
    // ============================================================

    /// Drop a session outright. Returns whether one existed.
    pub async fn evict(&self, meeting_id: &str) -> bool {
        self.sessions.write().await.remove(meeting_id).is_some()
    }

    /// Remove terminal sessions whose last update is older than the
    /// retention window, and fail streaming rounds that sat the whole
    /// window out with no attached listener and no engine activity (the
    /// socket died without a stop and nobody reconnected). Failed rounds
    /// age out through the normal path on a later pass. Returns how many
    /// sessions were dropped.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let candidates: Vec<(String, Arc<Mutex<Session>>)> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .map(|(id, slot)| (id.clone(), slot.clone()))
                .collect()
        };

        let mut expired = Vec::new();
        for (id, slot) in candidates {
            let mut session = slot.lock().await;
            if session.status.is_terminal() && self.is_expired(session.updated_at, now) {
                expired.push(id);
            } else if session.status == SessionStatus::Streaming
                && session.listeners() == 0
                && self.is_expired(session.updated_at, now)
            {
                // No subscriber can exist while we hold the lock, so there
                // is nobody to notify; a later subscriber sees the error in
                // its subscription snapshot.
                session.status = SessionStatus::Error;
                session.error =
                    Some("streaming session abandoned with no connected listener".to_string());
                session.audio_tx = None;
                session.touch();
                info!("Session {} abandoned; failing the streaming round", id);
            }
        }

        let mut removed = 0;
        let mut sessions = self.sessions.write().await;
        for id in expired {
            // Re-check under the write lock: a new round may have started
            // since the candidate pass.
            let still_expired = match sessions.get(&id) {
                Some(slot) => match slot.try_lock() {
                    Ok(session) => {
                        session.status.is_terminal() && self.is_expired(session.updated_at, now)
                    }
                    Err(_) => false,
                },
                None => false,
            };
            if still_expired {
                sessions.remove(&id);
                removed += 1;
            }
        }
        removed
    }

    fn is_expired(&self, updated_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(updated_at)
            .to_std()
            .map(|age| age >= self.retention)
            .unwrap_or(false)
    }

    /// Periodic retention sweeps until the returned handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let removed = registry.sweep(Utc::now()).await;
                if removed > 0 {
                    debug!("Swept {} expired sessions", removed);
                }
            }
        })
    }
}
