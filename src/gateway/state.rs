use std::sync::Arc;
use std::time::Duration;

use crate::auth::IdentityProvider;
use crate::engine::TranscriptionEngine;
use crate::session::SessionRegistry;

/// Shared application state for gateway handlers
#[derive(Clone)]
pub struct AppState {
    /// Single source of truth for per-meeting sessions
    pub registry: Arc<SessionRegistry>,

    /// External transcription engine
    pub engine: Arc<dyn TranscriptionEngine>,

    /// Caller identity verification
    pub identity: Arc<dyn IdentityProvider>,

    /// Bound on one round of engine work, from dispatch to terminal state
    pub processing_timeout: Duration,
}

impl AppState {
    pub fn new(
        registry: Arc<SessionRegistry>,
        engine: Arc<dyn TranscriptionEngine>,
        identity: Arc<dyn IdentityProvider>,
        processing_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            engine,
            identity,
            processing_timeout,
        }
    }
}
