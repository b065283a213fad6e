// Integration tests for the audio capture pipeline
//
// These run a WAV file through the source -> slicer -> encode path that the
// demo client uses for streaming submission.

use anyhow::Result;
use tempfile::TempDir;
use workmate_relay::{
    detect_format, AudioSource, ChunkSlicer, ChunkerConfig, WavFileSource,
};

fn write_wav(dir: &TempDir, name: &str, samples: &[i16], sample_rate: u32) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).expect("create wav");
    for &sample in samples {
        writer.write_sample(sample).expect("write sample");
    }
    writer.finalize().expect("finalize wav");
    path
}

#[tokio::test]
async fn test_wav_source_streams_the_whole_file() -> Result<()> {
    let dir = TempDir::new()?;
    // Half a second at 16 kHz mono.
    let samples: Vec<i16> = (0..8000).map(|i| ((i % 200) as i16 - 100) * 50).collect();
    let path = write_wav(&dir, "meeting.wav", &samples, 16_000);

    let mut source = WavFileSource::new(&path);
    let mut frames = source.start().await?;

    let mut received: Vec<i16> = Vec::new();
    let mut timestamps = Vec::new();
    while let Some(frame) = frames.recv().await {
        assert_eq!(frame.sample_rate, 16_000);
        assert_eq!(frame.channels, 1);
        timestamps.push(frame.timestamp_ms);
        received.extend_from_slice(&frame.samples);
    }

    assert_eq!(received, samples);
    // Default pacing is 100ms per frame: 8000 samples / 1600 per frame.
    assert_eq!(timestamps, vec![0, 100, 200, 300, 400]);
    Ok(())
}

#[tokio::test]
async fn test_sliced_chunks_encode_as_standalone_wav() -> Result<()> {
    let dir = TempDir::new()?;
    let samples: Vec<i16> = (0..32_000).map(|i| (i % 700) as i16 - 350).collect();
    let path = write_wav(&dir, "meeting.wav", &samples, 16_000);

    let mut source = WavFileSource::new(&path);
    let mut frames = source.start().await?;
    let mut slicer = ChunkSlicer::new(ChunkerConfig {
        chunk_duration_ms: 1000,
    });

    let mut chunks = Vec::new();
    while let Some(frame) = frames.recv().await {
        if let Some(chunk) = slicer.push(&frame) {
            chunks.push(chunk);
        }
    }
    if let Some(chunk) = slicer.flush() {
        chunks.push(chunk);
    }

    // Two seconds of audio in one-second chunks.
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].start_ms, 0);
    assert_eq!(chunks[1].start_ms, 1000);

    // Every chunk must stand alone as an uploadable WAV payload.
    let mut decoded: Vec<i16> = Vec::new();
    for chunk in &chunks {
        let payload = chunk.to_wav_bytes()?;
        assert_eq!(detect_format(&payload)?, "wav");

        let reader = hound::WavReader::new(std::io::Cursor::new(payload))?;
        assert_eq!(reader.spec().sample_rate, 16_000);
        decoded.extend(reader.into_samples::<i16>().collect::<Result<Vec<_>, _>>()?);
    }
    assert_eq!(decoded, samples);
    Ok(())
}

#[test]
fn test_detect_format_rejects_truncated_payloads() {
    let samples: Vec<i16> = (0..1600).map(|i| (i % 100) as i16).collect();
    let payload = workmate_relay::audio::wav_bytes(&samples, 16_000, 1).expect("encode wav");

    let truncated = &payload[..8];
    assert!(detect_format(truncated).is_err());
}
