use std::sync::Arc;

use tokio::sync::{broadcast, watch, Mutex};

use crate::session::{
    MeetingAnalysis, SessionEvent, SessionStatus, Tier, TranscriptChunk,
    SESSION_EVENT_CAPACITY,
};

/// Point-in-time view of a client-side session.
#[derive(Debug, Clone)]
pub struct ClientSnapshot {
    pub meeting_id: String,

    pub tier: Tier,

    pub status: SessionStatus,

    /// Failure description when `status == error`.
    pub error: Option<String>,

    /// Every delta received so far, in delivery order.
    pub transcript: Vec<TranscriptChunk>,

    /// Present once the session completed with an analysis.
    pub analysis: Option<MeetingAnalysis>,
}

impl ClientSnapshot {
    /// Full transcript text: final fragments joined with a single space.
    pub fn full_text(&self) -> String {
        self.transcript
            .iter()
            .filter(|c| !c.partial)
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug)]
struct SharedInner {
    status: SessionStatus,
    error: Option<String>,
    transcript: Vec<TranscriptChunk>,
    analysis: Option<MeetingAnalysis>,
    lost_attempts: Option<u32>,
}

/// State shared between a session handle and its transport task. Deltas are
/// buffered and fanned out under one lock, so subscriber order matches
/// buffer order. Once a terminal state is recorded it never changes.
#[derive(Debug)]
pub(crate) struct ClientShared {
    inner: Mutex<SharedInner>,
    events: broadcast::Sender<SessionEvent>,
    status_tx: watch::Sender<SessionStatus>,
}

impl ClientShared {
    pub(crate) fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        let (status_tx, _) = watch::channel(SessionStatus::Idle);
        Arc::new(Self {
            inner: Mutex::new(SharedInner {
                status: SessionStatus::Idle,
                error: None,
                transcript: Vec::new(),
                analysis: None,
                lost_attempts: None,
            }),
            events,
            status_tx,
        })
    }

    pub(crate) async fn set_status(&self, status: SessionStatus) {
        let mut inner = self.inner.lock().await;
        if inner.status.is_terminal() {
            return;
        }
        inner.status = status;
        self.status_tx.send_replace(status);
    }

    pub(crate) async fn push_delta(&self, chunk: TranscriptChunk) {
        let mut inner = self.inner.lock().await;
        if inner.status.is_terminal() {
            return;
        }
        inner.transcript.push(chunk.clone());
        let _ = self.events.send(SessionEvent::Delta(chunk));
    }

    pub(crate) async fn close(&self, status: SessionStatus, error: Option<String>) {
        let mut inner = self.inner.lock().await;
        if inner.status.is_terminal() {
            return;
        }
        inner.status = status;
        inner.error = error.clone();
        let _ = self.events.send(SessionEvent::Closed { status, error });
        self.status_tx.send_replace(status);
    }

    /// Terminal close after the reconnect budget ran out; remembers the
    /// attempt count so pending calls can raise the typed error.
    pub(crate) async fn close_lost(&self, attempts: u32, message: String) {
        let mut inner = self.inner.lock().await;
        if inner.status.is_terminal() {
            return;
        }
        inner.status = SessionStatus::Error;
        inner.error = Some(message.clone());
        inner.lost_attempts = Some(attempts);
        let _ = self.events.send(SessionEvent::Closed {
            status: SessionStatus::Error,
            error: Some(message),
        });
        self.status_tx.send_replace(SessionStatus::Error);
    }

    pub(crate) async fn connection_loss(&self) -> Option<u32> {
        self.inner.lock().await.lost_attempts
    }

    pub(crate) async fn set_analysis(&self, analysis: MeetingAnalysis) {
        let mut inner = self.inner.lock().await;
        inner.analysis = Some(analysis);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    pub(crate) async fn snapshot(&self, meeting_id: &str, tier: Tier) -> ClientSnapshot {
        let inner = self.inner.lock().await;
        ClientSnapshot {
            meeting_id: meeting_id.to_string(),
            tier,
            status: inner.status,
            error: inner.error.clone(),
            transcript: inner.transcript.clone(),
            analysis: inner.analysis.clone(),
        }
    }
}
