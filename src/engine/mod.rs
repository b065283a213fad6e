//! Transcription engine seam
//!
//! The gateway never talks to a speech-to-text system directly. It goes
//! through the `TranscriptionEngine` trait: the production implementation
//! relays over NATS, and tests substitute an in-process fake.

mod messages;
mod nats;

pub use messages::{
    AudioFrameMessage, TranscriptFragmentMessage, TranscriptionJobMessage,
    TranscriptionResultMessage,
};
pub use nats::NatsEngine;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::RelayResult;
use crate::session::{MeetingAnalysis, Tier};

/// Capacity of the per-stream audio and event channels. Feeding faster than
/// the engine accepts applies backpressure to the sender.
pub(crate) const ENGINE_CHANNEL_CAPACITY: usize = 64;

/// Result of a one-shot batch transcription.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchTranscription {
    /// Full transcript text.
    pub transcript: String,

    pub analysis: MeetingAnalysis,
}

/// Ordered events emitted by a live engine stream.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// One transcript fragment, in emission order.
    Delta { text: String, partial: bool },

    /// The engine drained its input and finished. Last event on success.
    Completed { analysis: Option<MeetingAnalysis> },

    /// Engine-side failure. Last event on failure.
    Failed(String),
}

/// A live engine stream: audio fragments go in, transcript events come out.
///
/// Dropping every clone of `audio_tx` signals end of audio; the engine
/// drains what it has, emits `Completed`, and closes the event channel.
/// Dropping `events_rx` abandons the stream and the engine side stops.
pub struct EngineStream {
    pub audio_tx: mpsc::Sender<Vec<u8>>,

    pub events_rx: mpsc::Receiver<EngineEvent>,
}

#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    /// Transcribe one complete audio payload and produce the analysis along
    /// with the transcript. Blocks until the engine replies; callers bound
    /// the wait.
    async fn transcribe(
        &self,
        meeting_id: &str,
        audio: &[u8],
        tier: Tier,
    ) -> RelayResult<BatchTranscription>;

    /// Open a live stream for a meeting.
    async fn open_stream(&self, meeting_id: &str) -> RelayResult<EngineStream>;

    /// Engine name for logging.
    fn name(&self) -> &str;
}
