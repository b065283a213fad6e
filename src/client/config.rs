use std::time::Duration;

use crate::session::Tier;

/// Configuration for a client-side transcription session
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Gateway base URL, e.g. "http://localhost:8090"
    pub gateway_url: String,

    /// Bearer credential presented on every call
    pub token: String,

    /// Poll cadence for batch status checks
    pub poll_interval: Duration,

    /// Overall bound on waiting for a terminal state after finalize
    pub result_timeout: Duration,

    /// Streaming reconnect policy
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gateway_url: "http://localhost:8090".to_string(),
            token: String::new(),
            poll_interval: Duration::from_secs(2),
            result_timeout: Duration::from_secs(300),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.gateway_url.trim_end_matches('/'), path)
    }

    /// WebSocket endpoint for a meeting's live channel.
    pub(crate) fn live_url(&self, meeting_id: &str, tier: Tier, from_seq: u64) -> String {
        let base = self.gateway_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("ws://{base}")
        };
        format!("{ws_base}/v1/transcription/live/{meeting_id}?tier={tier}&from_seq={from_seq}")
    }
}

/// Exponential backoff policy for the streaming transport
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,

    /// Ceiling for the backoff
    pub max_delay: Duration,

    /// Reconnect attempts before the session gives up
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(800),
            max_delay: Duration::from_secs(30),
            max_attempts: 6,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based): doubles each
    /// time, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(10);
        let delay = self.base_delay.saturating_mul(1u32 << shift);
        delay.min(self.max_delay)
    }
}
