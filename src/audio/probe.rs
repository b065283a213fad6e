use std::io::Cursor;

use symphonia::core::codecs::{
    CodecType, CODEC_TYPE_AAC, CODEC_TYPE_ALAC, CODEC_TYPE_FLAC, CODEC_TYPE_MP3,
    CODEC_TYPE_NULL, CODEC_TYPE_OPUS, CODEC_TYPE_PCM_F32LE, CODEC_TYPE_PCM_F64LE,
    CODEC_TYPE_PCM_S16BE, CODEC_TYPE_PCM_S16LE, CODEC_TYPE_PCM_S24LE, CODEC_TYPE_PCM_S32LE,
    CODEC_TYPE_PCM_U8, CODEC_TYPE_VORBIS,
};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{RelayError, RelayResult};

/// Identify the container format of an uploaded audio payload.
///
/// Probes the payload with symphonia and maps the first audio track's codec
/// to the product-facing label ("wav", "mp3", "m4a", ...). Payloads that do
/// not parse as a supported container are rejected before any session state
/// changes.
pub fn detect_format(payload: &[u8]) -> RelayResult<String> {
    if payload.is_empty() {
        return Err(RelayError::Validation(
            "audio payload must not be empty".to_string(),
        ));
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(payload.to_vec())), Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|_| {
            RelayError::Validation("unrecognized or unsupported audio format".to_string())
        })?;

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| RelayError::Validation("no audio track in payload".to_string()))?;

    match format_label(track.codec_params.codec) {
        Some(label) => Ok(label.to_string()),
        None => Err(RelayError::Validation(
            "unsupported audio codec".to_string(),
        )),
    }
}

fn format_label(codec: CodecType) -> Option<&'static str> {
    if codec == CODEC_TYPE_PCM_S16LE
        || codec == CODEC_TYPE_PCM_S16BE
        || codec == CODEC_TYPE_PCM_S24LE
        || codec == CODEC_TYPE_PCM_S32LE
        || codec == CODEC_TYPE_PCM_U8
        || codec == CODEC_TYPE_PCM_F32LE
        || codec == CODEC_TYPE_PCM_F64LE
    {
        Some("wav")
    } else if codec == CODEC_TYPE_MP3 {
        Some("mp3")
    } else if codec == CODEC_TYPE_AAC || codec == CODEC_TYPE_ALAC {
        Some("m4a")
    } else if codec == CODEC_TYPE_FLAC {
        Some("flac")
    } else if codec == CODEC_TYPE_VORBIS {
        Some("ogg")
    } else if codec == CODEC_TYPE_OPUS {
        Some("opus")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::encode::wav_bytes;

    #[test]
    fn test_detects_wav_payloads() {
        let samples: Vec<i16> = (0..16000).map(|i| ((i * 7) % 512) as i16 - 256).collect();
        let payload = wav_bytes(&samples, 16000, 1).unwrap();
        assert_eq!(detect_format(&payload).unwrap(), "wav");
    }

    #[test]
    fn test_rejects_garbage() {
        let err = detect_format(b"definitely not audio data, not even close").unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));
    }

    #[test]
    fn test_rejects_empty_payloads() {
        let err = detect_format(&[]).unwrap_err();
        assert!(matches!(err, RelayError::Validation(_)));
    }
}
