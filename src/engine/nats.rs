use anyhow::{Context, Result};
use async_nats::Client;
use async_trait::async_trait;
use base64::Engine as _;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::messages::{
    AudioFrameMessage, TranscriptFragmentMessage, TranscriptionJobMessage,
    TranscriptionResultMessage,
};
use super::{
    BatchTranscription, EngineEvent, EngineStream, TranscriptionEngine, ENGINE_CHANNEL_CAPACITY,
};
use crate::error::{RelayError, RelayResult};
use crate::session::{MeetingAnalysis, Tier};

/// Engine adapter that relays jobs and live audio over NATS.
///
/// Batch jobs go out on `transcription.job.<meeting>` and the reply comes
/// back on `transcription.result.<meeting>`. Live streams publish frames on
/// `transcription.audio.<meeting>` and consume fragments from
/// `transcription.text.<meeting>`, with an empty `final` frame marking end
/// of audio in each direction.
pub struct NatsEngine {
    client: Client,
}

impl NatsEngine {
    /// Connect to the NATS server the engine listens on.
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client })
    }

    fn job_subject(meeting_id: &str) -> String {
        format!("transcription.job.{meeting_id}")
    }

    fn result_subject(meeting_id: &str) -> String {
        format!("transcription.result.{meeting_id}")
    }

    fn audio_subject(meeting_id: &str) -> String {
        format!("transcription.audio.{meeting_id}")
    }

    fn text_subject(meeting_id: &str) -> String {
        format!("transcription.text.{meeting_id}")
    }
}

#[async_trait]
impl TranscriptionEngine for NatsEngine {
    async fn transcribe(
        &self,
        meeting_id: &str,
        audio: &[u8],
        tier: Tier,
    ) -> RelayResult<BatchTranscription> {
        // Subscribe before publishing so the reply cannot slip past us.
        let mut results = self
            .client
            .subscribe(Self::result_subject(meeting_id))
            .await
            .map_err(|e| RelayError::Engine(format!("engine subscribe failed: {e}")))?;

        let message = TranscriptionJobMessage {
            meeting_id: meeting_id.to_string(),
            audio: base64::engine::general_purpose::STANDARD.encode(audio),
            tier,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        let payload = serde_json::to_vec(&message)
            .map_err(|e| RelayError::Engine(format!("job encode failed: {e}")))?;

        self.client
            .publish(Self::job_subject(meeting_id), payload.into())
            .await
            .map_err(|e| RelayError::Engine(format!("job publish failed: {e}")))?;

        info!(
            "Published batch job for meeting {} ({} bytes, tier: {})",
            meeting_id,
            audio.len(),
            tier
        );

        while let Some(msg) = results.next().await {
            let result: TranscriptionResultMessage = match serde_json::from_slice(&msg.payload) {
                Ok(result) => result,
                Err(e) => {
                    warn!("Ignoring malformed engine result: {}", e);
                    continue;
                }
            };
            if result.meeting_id != meeting_id {
                continue;
            }
            if let Some(error) = result.error {
                return Err(RelayError::Engine(error));
            }
            return Ok(BatchTranscription {
                transcript: result.transcript,
                analysis: MeetingAnalysis {
                    summary: result.summary,
                    key_points: result.key_points,
                    action_items: result.action_items,
                },
            });
        }

        Err(RelayError::Engine(format!(
            "engine result stream closed for meeting {meeting_id}"
        )))
    }

    async fn open_stream(&self, meeting_id: &str) -> RelayResult<EngineStream> {
        let mut fragments = self
            .client
            .subscribe(Self::text_subject(meeting_id))
            .await
            .map_err(|e| RelayError::Engine(format!("engine subscribe failed: {e}")))?;

        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(ENGINE_CHANNEL_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(ENGINE_CHANNEL_CAPACITY);

        // Outbound: forward audio frames until the ingress closes, then an
        // empty final frame to mark end of audio.
        let client = self.client.clone();
        let subject = Self::audio_subject(meeting_id);
        let id = meeting_id.to_string();
        tokio::spawn(async move {
            let mut sequence: u64 = 0;
            while let Some(bytes) = audio_rx.recv().await {
                let message = AudioFrameMessage {
                    meeting_id: id.clone(),
                    sequence,
                    audio: base64::engine::general_purpose::STANDARD.encode(&bytes),
                    timestamp: chrono::Utc::now().to_rfc3339(),
                    final_frame: false,
                };
                let payload = match serde_json::to_vec(&message) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("Failed to encode audio frame: {}", e);
                        continue;
                    }
                };
                if let Err(e) = client.publish(subject.clone(), payload.into()).await {
                    warn!("Failed to publish audio frame: {}", e);
                    break;
                }
                sequence += 1;
            }

            let message = AudioFrameMessage {
                meeting_id: id.clone(),
                sequence,
                audio: String::new(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                final_frame: true,
            };
            if let Ok(payload) = serde_json::to_vec(&message) {
                if let Err(e) = client.publish(subject, payload.into()).await {
                    warn!("Failed to publish final audio frame: {}", e);
                }
            }
            info!("Audio stream for meeting {} closed after {} frames", id, sequence);
        });

        // Inbound: map engine fragments to events until the final marker.
        let id = meeting_id.to_string();
        tokio::spawn(async move {
            while let Some(msg) = fragments.next().await {
                let fragment: TranscriptFragmentMessage = match serde_json::from_slice(&msg.payload)
                {
                    Ok(fragment) => fragment,
                    Err(e) => {
                        warn!("Ignoring malformed transcript fragment: {}", e);
                        continue;
                    }
                };
                if fragment.meeting_id != id {
                    continue;
                }
                if !fragment.text.is_empty() {
                    let event = EngineEvent::Delta {
                        text: fragment.text,
                        partial: fragment.partial,
                    };
                    if events_tx.send(event).await.is_err() {
                        // Receiver dropped; the stream was abandoned.
                        break;
                    }
                }
                if fragment.final_frame {
                    // Analysis is not carried on the live wire; clients
                    // fetch it over REST after completion.
                    let _ = events_tx
                        .send(EngineEvent::Completed { analysis: None })
                        .await;
                    break;
                }
            }
        });

        Ok(EngineStream { audio_tx, events_rx })
    }

    fn name(&self) -> &str {
        "nats"
    }
}
