pub mod audio;
pub mod auth;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod session;

pub use audio::{
    detect_format, AudioChunk, AudioFrame, AudioSource, ChunkSlicer, ChunkerConfig, WavFileSource,
};
pub use auth::{HttpIdentityProvider, IdentityProvider, Principal, StaticIdentityProvider};
pub use client::{ClientConfig, ClientSnapshot, DeliveryMode, ReconnectPolicy, SessionClient};
pub use config::Config;
pub use engine::{BatchTranscription, EngineEvent, EngineStream, NatsEngine, TranscriptionEngine};
pub use error::{RelayError, RelayResult};
pub use gateway::{create_router, AppState};
pub use session::{
    MeetingAnalysis, SessionEvent, SessionRegistry, SessionSnapshot, SessionStatus, Tier,
    TranscriptChunk,
};
