use anyhow::Result;

use super::encode;
use super::source::AudioFrame;

/// Chunking configuration
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Duration of each chunk in milliseconds (default: 1000)
    pub chunk_duration_ms: u64,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_duration_ms: 1000,
        }
    }
}

/// A completed chunk of audio, ready to encode and submit
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Chunk number (0-indexed)
    pub index: usize,
    /// Raw samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Start time in milliseconds since capture started
    pub start_ms: u64,
    /// End time in milliseconds since capture started
    pub end_ms: u64,
}

impl AudioChunk {
    /// Encode this chunk as a standalone WAV payload.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        encode::wav_bytes(&self.samples, self.sample_rate, self.channels)
    }
}

/// Slices a frame stream into fixed-duration chunks
///
/// Receives audio frames from a source and groups them into chunks sized
/// for submission. Everything stays in memory; encoding is the caller's
/// call.
pub struct ChunkSlicer {
    config: ChunkerConfig,
    current: Option<AudioChunk>,
    chunk_index: usize,
}

impl ChunkSlicer {
    pub fn new(config: ChunkerConfig) -> Self {
        Self {
            config,
            current: None,
            chunk_index: 0,
        }
    }

    /// Feed one frame. Returns a finished chunk whenever the configured
    /// duration fills up; the frame itself lands in the next chunk.
    pub fn push(&mut self, frame: &AudioFrame) -> Option<AudioChunk> {
        let finished = if self.should_start_new_chunk(frame) {
            self.current.take()
        } else {
            None
        };

        let current = self.current.get_or_insert_with(|| {
            let chunk = AudioChunk {
                index: self.chunk_index,
                samples: Vec::new(),
                sample_rate: frame.sample_rate,
                channels: frame.channels,
                start_ms: frame.timestamp_ms,
                end_ms: frame.timestamp_ms,
            };
            self.chunk_index += 1;
            chunk
        });
        current.samples.extend_from_slice(&frame.samples);
        current.end_ms = frame.timestamp_ms;

        finished
    }

    /// Take the partial chunk at end of capture, if any.
    pub fn flush(&mut self) -> Option<AudioChunk> {
        self.current.take()
    }

    fn should_start_new_chunk(&self, frame: &AudioFrame) -> bool {
        match &self.current {
            None => false,
            Some(chunk) => {
                let elapsed_ms = frame.timestamp_ms.saturating_sub(chunk.start_ms);
                elapsed_ms >= self.config.chunk_duration_ms
            }
        }
    }
}
