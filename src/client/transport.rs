//! Streaming transport for the live channel
//!
//! One task per streaming session. It connects, pumps audio out and frames
//! in, and reconnects with exponential backoff when the connection drops
//! without the session having closed. Reconnects resume delivery with
//! `from_seq`, so fragments the client already saw are never duplicated.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, tungstenite, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::config::ClientConfig;
use super::state::ClientShared;
use crate::error::{RelayError, RelayResult};
use crate::protocol::{ClientFrame, ErrorResponse, ServerFrame};
use crate::session::{SessionStatus, Tier, TranscriptChunk};

/// Traffic from the session handle to the transport task.
pub(crate) enum Outgoing {
    /// One audio fragment for the engine.
    Audio(Vec<u8>),
    /// No more audio; wait for the session to close.
    End,
    /// Tear the channel down now.
    Stop,
}

/// Traffic that must survive a reconnect: an audio fragment whose send
/// failed, and an end marker that never got out.
#[derive(Default)]
struct Carry {
    audio: Option<Vec<u8>>,
    end: bool,
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum Drive {
    /// The gateway sent the closing frame; the session is over.
    SessionClosed,
    /// Stop was requested locally; the caller records the cancel.
    StopRequested,
    /// Every session handle is gone; nothing left to deliver to.
    HandleDropped,
    /// The connection died without a close; retry.
    ConnectionLost,
}

/// Drive the live channel until the session closes, stop is requested, or
/// the retry budget runs out.
pub(crate) async fn run_stream_transport(
    config: ClientConfig,
    meeting_id: String,
    tier: Tier,
    shared: Arc<ClientShared>,
    mut outgoing: mpsc::Receiver<Outgoing>,
) {
    let mut attempts: u32 = 0;
    let mut next_seq: u64 = 0;
    let mut carry = Carry::default();

    loop {
        let url = config.live_url(&meeting_id, tier, next_seq);
        let request = match build_request(&url, &config.token) {
            Ok(request) => request,
            Err(e) => {
                shared.close(SessionStatus::Error, Some(e.to_string())).await;
                return;
            }
        };

        match connect_async(request).await {
            Ok((ws, _)) => {
                if attempts > 0 {
                    info!(
                        "Reconnected live channel for meeting {} (attempt {})",
                        meeting_id, attempts
                    );
                }
                attempts = 0;
                shared.set_status(SessionStatus::Streaming).await;
                match drive(ws, &shared, &mut outgoing, &mut next_seq, &mut carry).await {
                    Drive::SessionClosed | Drive::StopRequested | Drive::HandleDropped => return,
                    Drive::ConnectionLost => {}
                }
            }
            Err(tungstenite::Error::Http(response)) if is_permanent(response.status().as_u16()) => {
                let error = rejection_error(&response);
                warn!(
                    "Live channel rejected for meeting {}: {}",
                    meeting_id, error
                );
                shared
                    .close(SessionStatus::Error, Some(error.to_string()))
                    .await;
                return;
            }
            Err(e) => {
                debug!("Live connect failed for meeting {}: {}", meeting_id, e);
            }
        }

        attempts += 1;
        if attempts > config.reconnect.max_attempts {
            let exhausted = attempts - 1;
            let error = RelayError::ConnectionLost {
                attempts: exhausted,
            };
            warn!(
                "Giving up on live channel for meeting {}: {}",
                meeting_id, error
            );
            shared.close_lost(exhausted, error.to_string()).await;
            return;
        }
        let delay = config.reconnect.delay_for(attempts);
        warn!(
            "Live channel lost for meeting {}; retrying in {:?} (attempt {}/{})",
            meeting_id, delay, attempts, config.reconnect.max_attempts
        );
        tokio::time::sleep(delay).await;
    }
}

async fn drive(
    ws: WsStream,
    shared: &Arc<ClientShared>,
    outgoing: &mut mpsc::Receiver<Outgoing>,
    next_seq: &mut u64,
    carry: &mut Carry,
) -> Drive {
    let (mut write, mut read) = ws.split();

    // Replay what the previous connection failed to deliver.
    if let Some(bytes) = carry.audio.take() {
        if let Err(e) = write.send(WsMessage::Binary(bytes.clone())).await {
            debug!("Audio resend failed: {}", e);
            carry.audio = Some(bytes);
            return Drive::ConnectionLost;
        }
    }
    if carry.end {
        if send_end(&mut write).await.is_err() {
            return Drive::ConnectionLost;
        }
        carry.end = false;
    }

    loop {
        tokio::select! {
            message = read.next() => match message {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<ServerFrame>(&text) {
                        Ok(ServerFrame::Delta { seq, text, partial, timestamp }) => {
                            // Replay overlap after a reconnect gets dropped
                            // here; everything else arrives in order.
                            if seq < *next_seq {
                                continue;
                            }
                            *next_seq = seq + 1;
                            shared
                                .push_delta(TranscriptChunk { seq, text, partial, timestamp })
                                .await;
                        }
                        Ok(ServerFrame::Closed { status, error }) => {
                            shared.close(status, error).await;
                            let _ = write.send(WsMessage::Close(None)).await;
                            return Drive::SessionClosed;
                        }
                        Err(e) => debug!("Ignoring unknown server frame: {}", e),
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => return Drive::ConnectionLost,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Live channel read error: {}", e);
                    return Drive::ConnectionLost;
                }
            },
            command = outgoing.recv() => match command {
                Some(Outgoing::Audio(bytes)) => {
                    if let Err(e) = write.send(WsMessage::Binary(bytes.clone())).await {
                        debug!("Audio send failed: {}", e);
                        carry.audio = Some(bytes);
                        return Drive::ConnectionLost;
                    }
                }
                Some(Outgoing::End) => {
                    carry.end = true;
                    if send_end(&mut write).await.is_err() {
                        return Drive::ConnectionLost;
                    }
                    carry.end = false;
                    // Keep pumping; the closing frame is still to come.
                }
                Some(Outgoing::Stop) => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return Drive::StopRequested;
                }
                None => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return Drive::HandleDropped;
                }
            },
        }
    }
}

async fn send_end<S>(write: &mut S) -> Result<(), ()>
where
    S: SinkExt<WsMessage> + Unpin,
{
    let frame = match serde_json::to_string(&ClientFrame::End) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Failed to encode end frame: {}", e);
            return Err(());
        }
    };
    write.send(WsMessage::Text(frame)).await.map_err(|_| ())
}

fn build_request(url: &str, token: &str) -> RelayResult<tungstenite::handshake::client::Request> {
    let mut request = url
        .into_client_request()
        .map_err(|e| RelayError::Validation(format!("invalid gateway url: {e}")))?;
    if !token.is_empty() {
        let value: HeaderValue = format!("Bearer {token}")
            .parse()
            .map_err(|_| RelayError::Unauthorized)?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    Ok(request)
}

/// Handshake rejections that retrying cannot fix.
fn is_permanent(status: u16) -> bool {
    matches!(status, 400 | 401 | 403)
}

fn rejection_error(response: &tungstenite::http::Response<Option<Vec<u8>>>) -> RelayError {
    let status = response.status().as_u16();
    let message = response
        .body()
        .as_ref()
        .and_then(|body| serde_json::from_slice::<ErrorResponse>(body).ok())
        .map(|body| body.error)
        .unwrap_or_else(|| format!("gateway returned status {status}"));
    RelayError::from_response(status, message)
}
