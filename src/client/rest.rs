use base64::Engine as _;
use reqwest::Response;

use super::config::ClientConfig;
use crate::error::{RelayError, RelayResult};
use crate::protocol::{
    AnalysisResponse, ErrorResponse, StatusResponse, TranscriptResponse, UploadRequest,
    UploadResponse,
};
use crate::session::Tier;

/// Thin wrapper over the gateway's batch endpoints. Non-2xx responses come
/// back as the error the gateway raised, rebuilt from the status code and
/// body.
#[derive(Debug)]
pub(crate) struct RestClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl RestClient {
    pub(crate) fn new(config: ClientConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    pub(crate) async fn upload(
        &self,
        meeting_id: &str,
        audio: &[u8],
        tier: Tier,
    ) -> RelayResult<UploadResponse> {
        let body = UploadRequest {
            meeting_id: meeting_id.to_string(),
            audio: base64::engine::general_purpose::STANDARD.encode(audio),
            tier,
        };
        let response = self
            .http
            .post(self.config.endpoint("/v1/transcription/upload"))
            .bearer_auth(&self.config.token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }

    pub(crate) async fn status(&self, meeting_id: &str) -> RelayResult<StatusResponse> {
        self.get(&format!("/v1/transcription/{meeting_id}/status"))
            .await
    }

    pub(crate) async fn transcript(&self, meeting_id: &str) -> RelayResult<TranscriptResponse> {
        self.get(&format!("/v1/transcription/{meeting_id}/transcript"))
            .await
    }

    pub(crate) async fn analysis(&self, meeting_id: &str) -> RelayResult<AnalysisResponse> {
        self.get(&format!("/v1/transcription/{meeting_id}/analysis"))
            .await
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> RelayResult<T> {
        let response = self
            .http
            .get(self.config.endpoint(path))
            .bearer_auth(&self.config.token)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }
}

fn transport_error(e: reqwest::Error) -> RelayError {
    RelayError::Engine(format!("gateway request failed: {e}"))
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> RelayResult<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| RelayError::Engine(format!("malformed gateway response: {e}")));
    }
    let code = status.as_u16();
    let message = match response.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => format!("gateway returned status {code}"),
    };
    Err(RelayError::from_response(code, message))
}
