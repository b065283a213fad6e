//! Audio capture and chunking
//!
//! Capture-side helpers for feeding the relay: a source seam producing PCM
//! frames, a slicer grouping frames into fixed-duration chunks, an
//! in-memory WAV encoder, and the container probe the gateway runs on
//! uploads.

mod chunker;
pub(crate) mod encode;
mod probe;
mod source;

pub use chunker::{AudioChunk, ChunkSlicer, ChunkerConfig};
pub use encode::wav_bytes;
pub use probe::detect_format;
pub use source::{AudioFrame, AudioSource, WavFileSource};
