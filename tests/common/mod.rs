// Shared test harness: an in-process gateway wired to a scriptable engine.
//
// `spawn_gateway` binds an ephemeral port and serves the real router, so
// tests exercise the same HTTP and WebSocket surface a deployed gateway
// exposes. `MockEngine` stands in for the NATS relay.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use workmate_relay::auth::StaticIdentityProvider;
use workmate_relay::{
    create_router, AppState, BatchTranscription, EngineEvent, EngineStream, MeetingAnalysis,
    RelayError, RelayResult, SessionRegistry, Tier, TranscriptionEngine,
};

/// Token the harness identity provider accepts.
pub const TOKEN: &str = "test-token";

enum BatchScript {
    Reply,
    Fail(String),
    Hang,
}

enum StreamScript {
    Echo,
    Fail(String),
}

/// Engine stand-in.
///
/// Batch calls reply with the scripted transcript. Live streams echo each
/// audio payload back as one final fragment (interpreting the bytes as
/// UTF-8), and complete when the audio channel closes, which mirrors the
/// real engine contract.
pub struct MockEngine {
    batch: BatchScript,
    stream: StreamScript,
    transcript: String,
}

impl MockEngine {
    pub fn replying(transcript: &str) -> Arc<Self> {
        Arc::new(Self {
            batch: BatchScript::Reply,
            stream: StreamScript::Echo,
            transcript: transcript.to_string(),
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            batch: BatchScript::Fail(message.to_string()),
            stream: StreamScript::Fail(message.to_string()),
            transcript: String::new(),
        })
    }

    pub fn hanging() -> Arc<Self> {
        Arc::new(Self {
            batch: BatchScript::Hang,
            stream: StreamScript::Echo,
            transcript: String::new(),
        })
    }

    /// The analysis a batch reply carries, derived from the transcript so
    /// tests can assert on it.
    pub fn analysis_for(transcript: &str) -> MeetingAnalysis {
        MeetingAnalysis {
            summary: format!("summary: {transcript}"),
            key_points: transcript.split_whitespace().map(String::from).collect(),
            action_items: vec![],
        }
    }
}

#[async_trait]
impl TranscriptionEngine for MockEngine {
    async fn transcribe(
        &self,
        _meeting_id: &str,
        _audio: &[u8],
        _tier: Tier,
    ) -> RelayResult<BatchTranscription> {
        match &self.batch {
            BatchScript::Reply => Ok(BatchTranscription {
                transcript: self.transcript.clone(),
                analysis: Self::analysis_for(&self.transcript),
            }),
            BatchScript::Fail(message) => Err(RelayError::Engine(message.clone())),
            BatchScript::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    async fn open_stream(&self, _meeting_id: &str) -> RelayResult<EngineStream> {
        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(64);
        let (events_tx, events_rx) = mpsc::channel(64);

        match &self.stream {
            StreamScript::Echo => {
                tokio::spawn(async move {
                    while let Some(audio) = audio_rx.recv().await {
                        let text = String::from_utf8_lossy(&audio).to_string();
                        if events_tx
                            .send(EngineEvent::Delta {
                                text,
                                partial: false,
                            })
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    let _ = events_tx
                        .send(EngineEvent::Completed { analysis: None })
                        .await;
                });
            }
            StreamScript::Fail(message) => {
                let message = message.clone();
                tokio::spawn(async move {
                    let _ = events_tx.send(EngineEvent::Failed(message)).await;
                    // Hold the audio side open; the failure closes the session.
                    while audio_rx.recv().await.is_some() {}
                });
            }
        }

        Ok(EngineStream {
            audio_tx,
            events_rx,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub struct TestGateway {
    pub base_url: String,
    pub registry: Arc<SessionRegistry>,
}

pub async fn spawn_gateway(engine: Arc<dyn TranscriptionEngine>) -> TestGateway {
    spawn_gateway_with(engine, Duration::from_secs(5)).await
}

pub async fn spawn_gateway_with(
    engine: Arc<dyn TranscriptionEngine>,
    processing_timeout: Duration,
) -> TestGateway {
    let registry = Arc::new(SessionRegistry::new(Duration::from_secs(3600)));
    let identity = Arc::new(StaticIdentityProvider::new([TOKEN.to_string()]));
    let state = AppState::new(registry.clone(), engine, identity, processing_timeout);
    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve test gateway");
    });

    TestGateway {
        base_url: format!("http://{addr}"),
        registry,
    }
}

/// TCP relay in front of a gateway.
///
/// `sever` drops every established link the way a dying network would,
/// without touching the server, so the next connection through the relay
/// finds the gateway healthy. Lets tests exercise connection-loss recovery
/// against the real WebSocket surface.
pub struct TcpProxy {
    pub addr: String,
    links: Arc<Mutex<Vec<JoinHandle<()>>>>,
    acceptor: JoinHandle<()>,
}

impl TcpProxy {
    /// Start relaying to `upstream` (a `host:port` pair) on an ephemeral
    /// local port.
    pub async fn spawn(upstream: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind proxy listener");
        let addr = listener.local_addr().expect("proxy address").to_string();
        let upstream = upstream.to_string();
        let links: Arc<Mutex<Vec<JoinHandle<()>>>> = Arc::new(Mutex::new(Vec::new()));

        let live = links.clone();
        let acceptor = tokio::spawn(async move {
            loop {
                let Ok((mut inbound, _)) = listener.accept().await else {
                    return;
                };
                let upstream = upstream.clone();
                let link = tokio::spawn(async move {
                    if let Ok(mut outbound) = TcpStream::connect(&upstream).await {
                        let _ = tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await;
                    }
                });
                live.lock().expect("proxy links").push(link);
            }
        });

        Self {
            addr,
            links,
            acceptor,
        }
    }

    /// Kill every established link; both ends see the socket die without a
    /// close handshake.
    pub fn sever(&self) {
        for link in self.links.lock().expect("proxy links").drain(..) {
            link.abort();
        }
    }
}

impl Drop for TcpProxy {
    fn drop(&mut self) {
        self.acceptor.abort();
        self.sever();
    }
}

/// A small but real WAV payload (16 kHz mono PCM) for upload tests.
pub fn wav_fixture(millis: u64) -> Vec<u8> {
    let total = (16_000 * millis / 1000) as usize;
    let samples: Vec<i16> = (0..total).map(|i| ((i * 13) % 600) as i16 - 300).collect();
    workmate_relay::audio::wav_bytes(&samples, 16_000, 1).expect("encode fixture")
}
