//! Live transcription channel
//!
//! One WebSocket per connected client. Binary frames carry audio toward the
//! engine; text frames carry control from the client and transcript deltas
//! back. Authorization and the tier gate run before the upgrade, so a
//! rejected caller gets a plain HTTP error and never holds a socket.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::handlers::bearer_token;
use super::state::AppState;
use crate::engine::EngineEvent;
use crate::error::{RelayError, RelayResult};
use crate::protocol::{ClientFrame, ServerFrame};
use crate::session::{
    SessionEvent, SessionStatus, StreamAttach, StreamStart, StreamSubscription, Tier,
};

/// How long the closing frame gets to flush after a client-initiated stop.
const STOP_FLUSH_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
pub struct LiveQuery {
    pub tier: Tier,

    /// Bearer credential, for clients that cannot set headers on the
    /// upgrade request.
    pub token: Option<String>,

    /// Resume delivery from this buffer sequence.
    pub from_seq: Option<u64>,
}

/// GET /v1/transcription/live/:meeting_id
/// Open the live duplex channel for a meeting; enterprise tier only
pub async fn live_transcription(
    ws: WebSocketUpgrade,
    Path(meeting_id): Path<String>,
    Query(query): Query<LiveQuery>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let token = match bearer_token(&headers) {
        Ok(token) => token.to_string(),
        Err(_) => match &query.token {
            Some(token) if !token.is_empty() => token.clone(),
            _ => return RelayError::Unauthorized.into_response(),
        },
    };
    if let Err(e) = state.identity.authenticate(&token).await {
        return e.into_response();
    }
    if !query.tier.allows_streaming() {
        return RelayError::tier_not_allowed(query.tier).into_response();
    }
    if meeting_id.trim().is_empty() {
        return RelayError::Validation("meeting id must not be empty".to_string()).into_response();
    }

    let from_seq = query.from_seq.unwrap_or(0);
    let tier = query.tier;
    ws.on_upgrade(move |socket| handle_socket(socket, state, meeting_id, tier, from_seq))
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    meeting_id: String,
    tier: Tier,
    from_seq: u64,
) {
    info!(
        "Live channel opened for meeting {} (from_seq: {})",
        meeting_id, from_seq
    );

    let ingress = match attach(&state, &meeting_id, tier).await {
        Ok(ingress) => ingress,
        Err(e) => {
            warn!("Live attach failed for meeting {}: {}", meeting_id, e);
            close_with_error(socket, e).await;
            return;
        }
    };

    let subscription = match state.registry.subscribe(&meeting_id, from_seq).await {
        Ok(subscription) => subscription,
        Err(e) => {
            close_with_error(socket, e).await;
            return;
        }
    };

    let (sender, receiver) = socket.split();

    // Outbound: replay what the client missed, then live events until the
    // session closes.
    let mut outbound = tokio::spawn(run_outbound(sender, subscription));

    // Inbound runs on this task; its outcome decides the session's fate.
    let disposition = run_inbound(receiver, ingress).await;

    match disposition {
        Inbound::Ended => {
            // No more audio. Let the engine drain; the outbound side
            // delivers the closing frame once the session completes.
            if let Err(e) = state.registry.release_ingress(&meeting_id).await {
                debug!("Ingress release for {} failed: {}", meeting_id, e);
            }
            if timeout(state.processing_timeout, &mut outbound)
                .await
                .is_err()
            {
                let message = RelayError::timeout(state.processing_timeout.as_secs()).to_string();
                let _ = state.registry.fail(&meeting_id, &message).await;
                outbound.abort();
            }
        }
        Inbound::Stopped => {
            // Deliberate stop cancels the round unless it already finished.
            match state.registry.cancel(&meeting_id).await {
                Ok(true) => info!("Session {} cancelled by client", meeting_id),
                Ok(false) => {}
                Err(e) => warn!("Cancel for {} failed: {}", meeting_id, e),
            }
            if timeout(STOP_FLUSH_GRACE, &mut outbound).await.is_err() {
                outbound.abort();
            }
        }
        Inbound::Lost => {
            // Connection dropped without a stop. The session keeps running
            // so the client can reconnect and resume from its last seq.
            outbound.abort();
        }
    }

    info!("Live channel closed for meeting {}", meeting_id);
}

/// Attach to the meeting's live stream, opening an engine stream when this
/// connection is the first one in. `None` means the session accepts no more
/// audio and the socket only observes.
async fn attach(
    state: &AppState,
    meeting_id: &str,
    tier: Tier,
) -> RelayResult<Option<mpsc::Sender<Vec<u8>>>> {
    match state.registry.attach_stream(meeting_id, tier).await? {
        StreamAttach::Live { ingress, .. } => return Ok(Some(ingress)),
        StreamAttach::Observe { .. } => return Ok(None),
        StreamAttach::NeedsEngine => {}
    }

    let stream = state.engine.open_stream(meeting_id).await?;
    let ingress = stream.audio_tx.clone();
    match state
        .registry
        .start_stream(meeting_id, tier, stream.audio_tx)
        .await?
    {
        StreamStart::Started { .. } => {
            spawn_engine_relay(state, meeting_id.to_string(), stream.events_rx);
            Ok(Some(ingress))
        }
        StreamStart::Raced {
            ingress: existing, ..
        } => {
            // Another connection installed its stream first. Dropping these
            // handles closes the one we opened.
            drop(ingress);
            drop(stream.events_rx);
            Ok(existing)
        }
    }
}

/// Pump engine events into the registry. Exactly one relay runs per engine
/// stream; every attached socket observes through the session feed instead.
fn spawn_engine_relay(state: &AppState, meeting_id: String, mut events: mpsc::Receiver<EngineEvent>) {
    let registry = state.registry.clone();
    tokio::spawn(async move {
        let mut closed = false;
        while let Some(event) = events.recv().await {
            match event {
                EngineEvent::Delta { text, partial } => {
                    match registry.append_chunk(&meeting_id, &text, partial).await {
                        Ok(Some(_)) => {}
                        Ok(None) => {
                            debug!("Dropping late fragment for closed session {}", meeting_id);
                            closed = true;
                            break;
                        }
                        Err(e) => {
                            warn!("Fragment append for {} failed: {}", meeting_id, e);
                            closed = true;
                            break;
                        }
                    }
                }
                EngineEvent::Completed { analysis } => {
                    if let Err(e) = registry.complete(&meeting_id, analysis).await {
                        warn!("Completion for {} failed: {}", meeting_id, e);
                    }
                    closed = true;
                    break;
                }
                EngineEvent::Failed(message) => {
                    if let Err(e) = registry.fail(&meeting_id, &message).await {
                        warn!("Failure record for {} failed: {}", meeting_id, e);
                    }
                    closed = true;
                    break;
                }
            }
        }
        if !closed {
            let _ = registry
                .fail(&meeting_id, "engine stream ended unexpectedly")
                .await;
        }
    });
}

enum Inbound {
    /// Client sent the end control frame; drain and complete.
    Ended,
    /// Client closed the channel deliberately; cancel the round.
    Stopped,
    /// Connection went away without a stop; leave the session running.
    Lost,
}

async fn run_inbound(
    mut receiver: SplitStream<WebSocket>,
    mut ingress: Option<mpsc::Sender<Vec<u8>>>,
) -> Inbound {
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Binary(audio)) => {
                if let Some(tx) = &ingress {
                    if tx.send(audio).await.is_err() {
                        // Engine input is gone; remaining audio has nowhere
                        // to go, but deltas may still be draining.
                        ingress = None;
                    }
                }
            }
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(ClientFrame::End) => return Inbound::Ended,
                Err(e) => debug!("Ignoring unknown control frame: {}", e),
            },
            Ok(Message::Close(_)) => return Inbound::Stopped,
            Ok(_) => {}
            Err(e) => {
                debug!("Live channel read error: {}", e);
                return Inbound::Lost;
            }
        }
    }
    Inbound::Lost
}

async fn run_outbound(mut sender: SplitSink<WebSocket, Message>, subscription: StreamSubscription) {
    let StreamSubscription {
        replay,
        mut events,
        status,
        error,
        mut next_seq,
    } = subscription;

    for chunk in replay {
        if send_frame(&mut sender, &ServerFrame::from(chunk)).await.is_err() {
            return;
        }
    }
    if status.is_terminal() {
        let _ = send_frame(&mut sender, &ServerFrame::Closed { status, error }).await;
        let _ = sender.send(Message::Close(None)).await;
        return;
    }

    loop {
        match events.recv().await {
            Ok(SessionEvent::Delta(chunk)) => {
                // Replay and the live feed are stitched under the registry
                // lock; the guard keeps a duplicate out all the same.
                if chunk.seq < next_seq {
                    continue;
                }
                next_seq = chunk.seq + 1;
                if send_frame(&mut sender, &ServerFrame::from(chunk)).await.is_err() {
                    return;
                }
            }
            Ok(SessionEvent::Closed { status, error }) => {
                let _ = send_frame(&mut sender, &ServerFrame::Closed { status, error }).await;
                let _ = sender.send(Message::Close(None)).await;
                return;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                // Too slow for the feed; close so the client reconnects and
                // catches up over replay.
                warn!("Live listener lagged by {} events; closing", skipped);
                let _ = sender.send(Message::Close(None)).await;
                return;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    let payload = match serde_json::to_string(frame) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Failed to encode server frame: {}", e);
            return Ok(());
        }
    };
    sender.send(Message::Text(payload)).await
}

async fn close_with_error(mut socket: WebSocket, error: RelayError) {
    let frame = ServerFrame::Closed {
        status: SessionStatus::Error,
        error: Some(error.to_string()),
    };
    if let Ok(payload) = serde_json::to_string(&frame) {
        let _ = socket.send(Message::Text(payload)).await;
    }
    let _ = socket.close().await;
}
