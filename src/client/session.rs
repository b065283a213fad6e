use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::config::ClientConfig;
use super::rest::RestClient;
use super::state::{ClientShared, ClientSnapshot};
use super::transport::{run_stream_transport, Outgoing};
use crate::error::{RelayError, RelayResult};
use crate::session::{SessionEvent, SessionStatus, Tier};

/// How long a deliberate stop waits for the transport to wind down.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// How transcript fragments reach the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Buffer locally, upload once, poll for the result.
    Batch,
    /// Feed audio over the live channel and receive deltas as they happen.
    Streaming,
}

/// Client-side handle for one meeting's transcription session.
///
/// The delivery mode is fixed at construction; asking for streaming on a
/// tier that does not include it fails before any network activity. The
/// handle is a scoped resource: `stop` closes it deliberately, and dropping
/// it tears the transport down.
#[derive(Debug)]
pub struct SessionClient {
    meeting_id: String,
    tier: Tier,
    mode: DeliveryMode,
    config: ClientConfig,
    rest: RestClient,
    shared: Arc<ClientShared>,

    // Batch state
    pending: Vec<u8>,
    finalized: bool,

    // Streaming state
    outgoing: Option<mpsc::Sender<Outgoing>>,
    transport: Option<JoinHandle<()>>,
}

impl SessionClient {
    /// Open a session for a meeting. Streaming mode connects immediately;
    /// batch mode touches the network only at `finalize`.
    pub async fn start(
        config: ClientConfig,
        meeting_id: &str,
        tier: Tier,
        mode: DeliveryMode,
    ) -> RelayResult<Self> {
        if meeting_id.trim().is_empty() {
            return Err(RelayError::Validation(
                "meeting id must not be empty".to_string(),
            ));
        }
        if mode == DeliveryMode::Streaming && !tier.allows_streaming() {
            return Err(RelayError::InvalidTier(tier));
        }

        let mut client = Self {
            meeting_id: meeting_id.trim().to_string(),
            tier,
            mode,
            rest: RestClient::new(config.clone()),
            config,
            shared: ClientShared::new(),
            pending: Vec::new(),
            finalized: false,
            outgoing: None,
            transport: None,
        };

        if mode == DeliveryMode::Streaming {
            let (tx, rx) = mpsc::channel(64);
            let task = tokio::spawn(run_stream_transport(
                client.config.clone(),
                client.meeting_id.clone(),
                tier,
                client.shared.clone(),
                rx,
            ));
            client.outgoing = Some(tx);
            client.transport = Some(task);
            info!("Streaming session opened for meeting {}", client.meeting_id);
        }

        Ok(client)
    }

    pub fn meeting_id(&self) -> &str {
        &self.meeting_id
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Ordered feed of transcript deltas and the closing event. Batch
    /// sessions emit the whole feed at finalize; streaming sessions emit as
    /// fragments arrive.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.subscribe()
    }

    pub async fn snapshot(&self) -> ClientSnapshot {
        self.shared.snapshot(&self.meeting_id, self.tier).await
    }

    /// Hand one audio fragment to the session. Batch mode buffers it
    /// locally; streaming mode sends it to the gateway.
    pub async fn submit_audio_chunk(&mut self, audio: &[u8]) -> RelayResult<()> {
        if audio.is_empty() {
            return Err(RelayError::Validation(
                "audio fragment must not be empty".to_string(),
            ));
        }
        if self.finalized {
            return Err(RelayError::Validation(
                "session is already finalized".to_string(),
            ));
        }
        match self.mode {
            DeliveryMode::Batch => {
                self.pending.extend_from_slice(audio);
                Ok(())
            }
            DeliveryMode::Streaming => self.send(Outgoing::Audio(audio.to_vec())).await,
        }
    }

    /// Finish the session and wait for the result. Batch mode uploads the
    /// buffered audio and polls to a terminal state; streaming mode sends
    /// the end marker and waits for the closing frame.
    pub async fn finalize(&mut self) -> RelayResult<ClientSnapshot> {
        if self.finalized {
            return Ok(self.snapshot().await);
        }
        self.finalized = true;
        match self.mode {
            DeliveryMode::Batch => self.finalize_batch().await,
            DeliveryMode::Streaming => self.finalize_stream().await,
        }
    }

    /// Close the session. A streaming stop tells the gateway to cancel the
    /// round unless it already finished; batch mode holds nothing open.
    pub async fn stop(&mut self) -> RelayResult<()> {
        if self.mode == DeliveryMode::Batch {
            return Ok(());
        }
        if let Some(tx) = self.outgoing.take() {
            let _ = tx.send(Outgoing::Stop).await;
        }
        if let Some(mut task) = self.transport.take() {
            if timeout(STOP_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        }
        self.shared.close(SessionStatus::Cancelled, None).await;
        self.finalized = true;
        info!("Streaming session stopped for meeting {}", self.meeting_id);
        Ok(())
    }

    async fn send(&self, command: Outgoing) -> RelayResult<()> {
        let Some(tx) = &self.outgoing else {
            return Err(RelayError::Validation(
                "session is already closed".to_string(),
            ));
        };
        if tx.send(command).await.is_err() {
            // Transport exited; its last word is on the shared state.
            return Err(self.terminal_error().await);
        }
        Ok(())
    }

    async fn terminal_error(&self) -> RelayError {
        if let Some(attempts) = self.shared.connection_loss().await {
            return RelayError::ConnectionLost { attempts };
        }
        let snapshot = self.shared.snapshot(&self.meeting_id, self.tier).await;
        RelayError::Engine(
            snapshot
                .error
                .unwrap_or_else(|| "streaming transport closed".to_string()),
        )
    }

    async fn finalize_batch(&mut self) -> RelayResult<ClientSnapshot> {
        if self.pending.is_empty() {
            return Err(RelayError::Validation(
                "no audio was submitted".to_string(),
            ));
        }
        let audio = std::mem::take(&mut self.pending);
        if audio.len() > self.tier.max_upload_bytes() {
            return Err(RelayError::Validation(format!(
                "buffered audio of {} bytes exceeds the {} tier limit",
                audio.len(),
                self.tier
            )));
        }

        self.shared.set_status(SessionStatus::Uploading).await;
        let accepted = match self.rest.upload(&self.meeting_id, &audio, self.tier).await {
            Ok(accepted) => accepted,
            Err(e) => {
                self.shared
                    .close(SessionStatus::Error, Some(e.to_string()))
                    .await;
                return Err(e);
            }
        };
        info!(
            "Upload accepted for meeting {} as {} (handle {})",
            self.meeting_id, accepted.file_format, accepted.session_handle
        );
        self.shared.set_status(SessionStatus::Processing).await;

        let deadline = tokio::time::Instant::now() + self.config.result_timeout;
        loop {
            let status = match self.rest.status(&self.meeting_id).await {
                Ok(status) => status,
                Err(e) => {
                    self.shared
                        .close(SessionStatus::Error, Some(e.to_string()))
                        .await;
                    return Err(e);
                }
            };
            match status.status {
                SessionStatus::Completed => break,
                SessionStatus::Error => {
                    let message = status
                        .error
                        .unwrap_or_else(|| "transcription failed".to_string());
                    self.shared
                        .close(SessionStatus::Error, Some(message.clone()))
                        .await;
                    return Err(RelayError::Engine(message));
                }
                SessionStatus::Cancelled => {
                    self.shared.close(SessionStatus::Cancelled, None).await;
                    return Ok(self.snapshot().await);
                }
                _ => {}
            }
            if tokio::time::Instant::now() >= deadline {
                let e = RelayError::timeout(self.config.result_timeout.as_secs());
                self.shared
                    .close(SessionStatus::Error, Some(e.to_string()))
                    .await;
                return Err(e);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }

        // Deliver the result through the same feed streaming uses: one
        // delta per fragment, then the closing event.
        let transcript = self.rest.transcript(&self.meeting_id).await?;
        for chunk in transcript.chunks {
            self.shared.push_delta(chunk).await;
        }
        match self.rest.analysis(&self.meeting_id).await {
            Ok(response) => self.shared.set_analysis(response.analysis).await,
            Err(RelayError::NotReady(_)) => {}
            Err(e) => warn!("Analysis fetch for {} failed: {}", self.meeting_id, e),
        }
        self.shared.close(SessionStatus::Completed, None).await;
        Ok(self.snapshot().await)
    }

    async fn finalize_stream(&mut self) -> RelayResult<ClientSnapshot> {
        self.send(Outgoing::End).await?;

        let mut status_rx = self.shared.watch_status();
        let wait = async {
            loop {
                let status = *status_rx.borrow_and_update();
                if status.is_terminal() {
                    break;
                }
                if status_rx.changed().await.is_err() {
                    break;
                }
            }
        };
        if timeout(self.config.result_timeout, wait).await.is_err() {
            let e = RelayError::timeout(self.config.result_timeout.as_secs());
            self.shared
                .close(SessionStatus::Error, Some(e.to_string()))
                .await;
            return Err(e);
        }

        let snapshot = self.snapshot().await;
        if snapshot.status == SessionStatus::Error {
            return Err(self.terminal_error().await);
        }
        if snapshot.status == SessionStatus::Completed && snapshot.analysis.is_none() {
            // Analysis travels over REST even for streamed sessions.
            match self.rest.analysis(&self.meeting_id).await {
                Ok(response) => self.shared.set_analysis(response.analysis).await,
                Err(RelayError::NotReady(_)) => {}
                Err(e) => debug!("Analysis fetch for {} failed: {}", self.meeting_id, e),
            }
        }
        Ok(self.snapshot().await)
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        if let Some(task) = self.transport.take() {
            task.abort();
        }
    }
}
