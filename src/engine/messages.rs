use serde::{Deserialize, Serialize};

use crate::session::Tier;

/// Batch transcription job published to the engine
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptionJobMessage {
    pub meeting_id: String,
    pub audio: String, // Base64-encoded payload
    pub tier: Tier,
    pub timestamp: String, // RFC3339 timestamp
}

/// Batch result received from the engine
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptionResultMessage {
    pub meeting_id: String,
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub action_items: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
    pub timestamp: String,
}

/// Audio frame published on a live stream
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioFrameMessage {
    pub meeting_id: String,
    pub sequence: u64,
    pub audio: String, // Base64-encoded fragment, empty on the final frame
    pub timestamp: String,
    #[serde(rename = "final")]
    pub final_frame: bool,
}

/// Transcript fragment received on a live stream
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptFragmentMessage {
    pub meeting_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub partial: bool,
    pub timestamp: String,
    #[serde(rename = "final", default)]
    pub final_frame: bool,
}
