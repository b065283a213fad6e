//! Demo client for the relay gateway.
//!
//! Feeds a WAV file through either delivery mode and prints the transcript
//! as it arrives:
//!
//! ```text
//! relay-client --meeting-id standup-0825 --token dev-token --file meeting.wav --mode streaming
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use workmate_relay::{
    AudioSource, ChunkSlicer, ChunkerConfig, ClientConfig, DeliveryMode, SessionClient,
    SessionEvent, Tier, WavFileSource,
};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Mode {
    Batch,
    Streaming,
}

#[derive(Parser, Debug)]
#[command(name = "relay-client", about = "Feed a WAV file to the relay gateway")]
struct Args {
    /// Gateway base URL
    #[arg(long, default_value = "http://localhost:8090")]
    gateway: String,

    /// Bearer token
    #[arg(long)]
    token: String,

    /// Meeting to transcribe
    #[arg(long)]
    meeting_id: String,

    /// Plan tier (basic, premium, enterprise)
    #[arg(long, default_value = "premium")]
    tier: Tier,

    /// Delivery mode; streaming needs the enterprise tier
    #[arg(long, value_enum, default_value = "batch")]
    mode: Mode,

    /// WAV file to submit
    #[arg(long)]
    file: String,

    /// Chunk duration for streaming submission, in milliseconds
    #[arg(long, default_value_t = 1000)]
    chunk_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let config = ClientConfig {
        gateway_url: args.gateway.clone(),
        token: args.token.clone(),
        ..ClientConfig::default()
    };
    let mode = match args.mode {
        Mode::Batch => DeliveryMode::Batch,
        Mode::Streaming => DeliveryMode::Streaming,
    };

    let mut session = SessionClient::start(config, &args.meeting_id, args.tier, mode).await?;

    // Print fragments as they land. Batch sessions emit the whole feed at
    // finalize, streaming sessions emit live.
    let mut events = session.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::Delta(chunk) if !chunk.partial => {
                    println!("[{:>4}] {}", chunk.seq, chunk.text);
                }
                SessionEvent::Delta(chunk) => {
                    println!("[{:>4}] ({}...)", chunk.seq, chunk.text);
                }
                SessionEvent::Closed { status, error } => {
                    match error {
                        Some(message) => println!("Session closed: {} ({})", status, message),
                        None => println!("Session closed: {}", status),
                    }
                    break;
                }
            }
        }
    });

    match mode {
        DeliveryMode::Streaming => {
            let mut source = WavFileSource::new(&args.file);
            let mut frames = source.start().await?;
            let mut slicer = ChunkSlicer::new(ChunkerConfig {
                chunk_duration_ms: args.chunk_ms,
            });
            while let Some(frame) = frames.recv().await {
                if let Some(chunk) = slicer.push(&frame) {
                    session.submit_audio_chunk(&chunk.to_wav_bytes()?).await?;
                }
            }
            if let Some(chunk) = slicer.flush() {
                session.submit_audio_chunk(&chunk.to_wav_bytes()?).await?;
            }
        }
        DeliveryMode::Batch => {
            let audio = std::fs::read(&args.file)
                .with_context(|| format!("Failed to read {}", args.file))?;
            session.submit_audio_chunk(&audio).await?;
        }
    }

    let snapshot = session.finalize().await?;
    printer.await?;

    println!();
    println!("Transcript:\n{}", snapshot.full_text());
    if let Some(analysis) = snapshot.analysis {
        println!();
        println!("Summary: {}", analysis.summary);
        for point in &analysis.key_points {
            println!("  - {}", point);
        }
        for item in &analysis.action_items {
            println!("  * {}", item);
        }
    }

    Ok(())
}
