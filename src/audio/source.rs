use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use hound::WavReader;
use tokio::sync::mpsc;
use tracing::info;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Audio capture source trait
///
/// Produces the frame stream the chunker slices up. Capture hardware,
/// files, and test fixtures all sit behind this seam.
#[async_trait::async_trait]
pub trait AudioSource: Send + Sync {
    /// Start producing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop producing audio
    async fn stop(&mut self) -> Result<()>;

    /// Get source name for logging
    fn name(&self) -> &str;
}

/// Reads frames from a WAV file. Used by the demo client and batch tooling.
pub struct WavFileSource {
    path: PathBuf,
    frame_duration_ms: u64,
    running: Arc<AtomicBool>,
}

impl WavFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            frame_duration_ms: 100,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_frame_duration(mut self, frame_duration_ms: u64) -> Self {
        self.frame_duration_ms = frame_duration_ms;
        self
    }
}

#[async_trait::async_trait]
impl AudioSource for WavFileSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        info!("Opening audio file: {}", self.path.display());

        let reader = WavReader::open(&self.path).context("Failed to open WAV file")?;
        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64),
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let frame_duration_ms = self.frame_duration_ms;
        let samples_per_frame =
            (spec.sample_rate as u64 * frame_duration_ms / 1000).max(1) as usize
                * spec.channels as usize;

        // Frames are pushed as fast as the receiver takes them; the small
        // channel capacity is what paces a slow consumer.
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut timestamp_ms: u64 = 0;
            for window in samples.chunks(samples_per_frame) {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let frame = AudioFrame {
                    samples: window.to_vec(),
                    sample_rate: spec.sample_rate,
                    channels: spec.channels,
                    timestamp_ms,
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
                timestamp_ms += frame_duration_ms;
            }
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}
