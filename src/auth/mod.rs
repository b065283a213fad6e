//! Caller identity verification
//!
//! Every gateway operation requires a bearer credential. Verification is
//! delegated through the `IdentityProvider` trait: production deployments
//! point it at the identity service, development and tests use a static
//! token list.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{RelayError, RelayResult};

/// A verified caller.
#[derive(Debug, Clone)]
pub struct Principal {
    pub subject: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify a bearer credential. Any failure to verify, including the
    /// identity service being unreachable, is an authorization failure.
    async fn authenticate(&self, token: &str) -> RelayResult<Principal>;
}

/// Delegates verification to a remote identity service over HTTP.
pub struct HttpIdentityProvider {
    verify_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    subject: String,
}

impl HttpIdentityProvider {
    pub fn new(verify_url: &str) -> Self {
        Self {
            verify_url: verify_url.to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn authenticate(&self, token: &str) -> RelayResult<Principal> {
        if token.is_empty() {
            return Err(RelayError::Unauthorized);
        }

        let response = self
            .http
            .post(&self.verify_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                warn!("Identity service unreachable: {}", e);
                RelayError::Unauthorized
            })?;

        if !response.status().is_success() {
            debug!("Identity service rejected credential: {}", response.status());
            return Err(RelayError::Unauthorized);
        }

        let verified: VerifyResponse = response.json().await.map_err(|e| {
            warn!("Malformed identity service response: {}", e);
            RelayError::Unauthorized
        })?;

        Ok(Principal {
            subject: verified.subject,
        })
    }
}

/// Accepts a fixed token set. For local development and tests only.
pub struct StaticIdentityProvider {
    tokens: HashSet<String>,
}

impl StaticIdentityProvider {
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        Self {
            tokens: tokens.into_iter().collect(),
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn authenticate(&self, token: &str) -> RelayResult<Principal> {
        if self.tokens.contains(token) {
            Ok(Principal {
                subject: "local".to_string(),
            })
        } else {
            Err(RelayError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider_accepts_configured_tokens() {
        let provider = StaticIdentityProvider::new(vec!["alpha".to_string()]);
        assert!(provider.authenticate("alpha").await.is_ok());
        assert!(matches!(
            provider.authenticate("beta").await,
            Err(RelayError::Unauthorized)
        ));
        assert!(matches!(
            provider.authenticate("").await,
            Err(RelayError::Unauthorized)
        ));
    }
}
