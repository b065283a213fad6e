// Integration tests for the gateway's REST surface
//
// Each test spawns the real router on an ephemeral port and drives it over
// HTTP, with the engine scripted through the shared mock.

mod common;

use std::time::Duration;

use anyhow::Result;
use base64::Engine as _;
use common::{spawn_gateway, spawn_gateway_with, wav_fixture, MockEngine, TestGateway, TOKEN};
use workmate_relay::protocol::{
    AnalysisResponse, ErrorResponse, StatusResponse, TranscriptResponse, UploadRequest,
    UploadResponse,
};
use workmate_relay::{SessionStatus, Tier};

fn http() -> reqwest::Client {
    reqwest::Client::new()
}

fn upload_request(meeting_id: &str, audio: &[u8], tier: Tier) -> UploadRequest {
    UploadRequest {
        meeting_id: meeting_id.to_string(),
        audio: base64::engine::general_purpose::STANDARD.encode(audio),
        tier,
    }
}

async fn post_upload(
    gateway: &TestGateway,
    token: Option<&str>,
    request: &UploadRequest,
) -> reqwest::Response {
    let mut builder = http()
        .post(format!("{}/v1/transcription/upload", gateway.base_url))
        .json(request);
    if let Some(token) = token {
        builder = builder.bearer_auth(token);
    }
    builder.send().await.expect("send upload")
}

/// Poll until the session leaves the active states or the deadline passes.
async fn poll_until_terminal(gateway: &TestGateway, meeting_id: &str) -> StatusResponse {
    let url = format!(
        "{}/v1/transcription/{}/status",
        gateway.base_url, meeting_id
    );
    for _ in 0..100 {
        let status: StatusResponse = http()
            .get(&url)
            .bearer_auth(TOKEN)
            .send()
            .await
            .expect("send status")
            .json()
            .await
            .expect("decode status");
        if status.status.is_terminal() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("session for {meeting_id} never reached a terminal state");
}

#[tokio::test]
async fn test_health_endpoint() {
    let gateway = spawn_gateway(MockEngine::replying("ok")).await;
    let response = http()
        .get(format!("{}/health", gateway.base_url))
        .send()
        .await
        .expect("send health");
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.expect("body"), "OK");
}

#[tokio::test]
async fn test_upload_requires_a_credential() {
    let gateway = spawn_gateway(MockEngine::replying("ok")).await;
    let request = upload_request("m1", &wav_fixture(50), Tier::Basic);

    let response = post_upload(&gateway, None, &request).await;
    assert_eq!(response.status(), 401);

    let response = post_upload(&gateway, Some("wrong-token"), &request).await;
    assert_eq!(response.status(), 401);
    let body: ErrorResponse = response.json().await.expect("error body");
    assert!(!body.error.is_empty());
}

#[tokio::test]
async fn test_upload_rejects_payloads_that_are_not_audio() {
    let gateway = spawn_gateway(MockEngine::replying("ok")).await;
    let request = upload_request("m1", b"just some text pretending to be audio", Tier::Basic);

    let response = post_upload(&gateway, Some(TOKEN), &request).await;
    assert_eq!(response.status(), 400);

    // The rejected upload must not have left a session behind.
    let response = http()
        .get(format!("{}/v1/transcription/m1/status", gateway.base_url))
        .bearer_auth(TOKEN)
        .send()
        .await
        .expect("send status");
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_upload_rejects_invalid_base64() {
    let gateway = spawn_gateway(MockEngine::replying("ok")).await;
    let request = UploadRequest {
        meeting_id: "m1".to_string(),
        audio: "this is not base64!!!".to_string(),
        tier: Tier::Basic,
    };

    let response = post_upload(&gateway, Some(TOKEN), &request).await;
    assert_eq!(response.status(), 400);
    let body: ErrorResponse = response.json().await.expect("error body");
    assert!(body.error.contains("base64"));
}

#[tokio::test]
async fn test_upload_rejects_payloads_over_the_tier_limit() {
    let gateway = spawn_gateway(MockEngine::replying("ok")).await;
    let oversize = vec![0u8; Tier::Basic.max_upload_bytes() + 1];
    let request = upload_request("m1", &oversize, Tier::Basic);

    let response = post_upload(&gateway, Some(TOKEN), &request).await;
    assert_eq!(response.status(), 400);
    let body: ErrorResponse = response.json().await.expect("error body");
    assert!(body.error.contains("exceeds"));
}

#[tokio::test]
async fn test_upload_and_poll_to_completion() {
    let gateway = spawn_gateway(MockEngine::replying("hello from the relay")).await;
    let request = upload_request("standup", &wav_fixture(100), Tier::Basic);

    let response = post_upload(&gateway, Some(TOKEN), &request).await;
    assert_eq!(response.status(), 200);
    let accepted: UploadResponse = response.json().await.expect("upload body");
    assert_eq!(accepted.meeting_id, "standup");
    assert_eq!(accepted.status, SessionStatus::Processing);
    assert_eq!(accepted.file_format, "wav");
    assert_eq!(accepted.tier, Tier::Basic);

    let status = poll_until_terminal(&gateway, "standup").await;
    assert_eq!(status.status, SessionStatus::Completed);
    assert_eq!(status.chunks, 1);

    let transcript: TranscriptResponse = http()
        .get(format!(
            "{}/v1/transcription/standup/transcript",
            gateway.base_url
        ))
        .bearer_auth(TOKEN)
        .send()
        .await
        .expect("send transcript")
        .json()
        .await
        .expect("decode transcript");
    assert_eq!(transcript.text, "hello from the relay");
    assert_eq!(transcript.chunks.len(), 1);

    let analysis: AnalysisResponse = http()
        .get(format!(
            "{}/v1/transcription/standup/analysis",
            gateway.base_url
        ))
        .bearer_auth(TOKEN)
        .send()
        .await
        .expect("send analysis")
        .json()
        .await
        .expect("decode analysis");
    assert_eq!(analysis.analysis.summary, "summary: hello from the relay");
    assert_eq!(analysis.analysis.key_points.len(), 4);
}

#[tokio::test]
async fn test_results_are_conflict_until_processing_finishes() {
    let gateway = spawn_gateway(MockEngine::hanging()).await;
    let request = upload_request("m1", &wav_fixture(50), Tier::Basic);
    post_upload(&gateway, Some(TOKEN), &request).await;

    // A poll straight after the upload sees the round in flight.
    let status: StatusResponse = http()
        .get(format!("{}/v1/transcription/m1/status", gateway.base_url))
        .bearer_auth(TOKEN)
        .send()
        .await
        .expect("send status")
        .json()
        .await
        .expect("decode status");
    assert_eq!(status.status, SessionStatus::Processing);

    let response = http()
        .get(format!(
            "{}/v1/transcription/m1/transcript",
            gateway.base_url
        ))
        .bearer_auth(TOKEN)
        .send()
        .await
        .expect("send transcript");
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn test_engine_failure_surfaces_through_status() {
    let gateway = spawn_gateway(MockEngine::failing("the model fell over")).await;
    let request = upload_request("m1", &wav_fixture(50), Tier::Basic);
    post_upload(&gateway, Some(TOKEN), &request).await;

    let status = poll_until_terminal(&gateway, "m1").await;
    assert_eq!(status.status, SessionStatus::Error);
    assert_eq!(status.error.as_deref(), Some("the model fell over"));
}

#[tokio::test]
async fn test_processing_timeout_fails_the_session() {
    let gateway = spawn_gateway_with(MockEngine::hanging(), Duration::from_millis(100)).await;
    let request = upload_request("m1", &wav_fixture(50), Tier::Basic);
    post_upload(&gateway, Some(TOKEN), &request).await;

    let status = poll_until_terminal(&gateway, "m1").await;
    assert_eq!(status.status, SessionStatus::Error);
    assert!(status
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("no transcription result"));
}

#[tokio::test]
async fn test_status_for_unknown_meeting_is_404() {
    let gateway = spawn_gateway(MockEngine::replying("ok")).await;
    let response = http()
        .get(format!(
            "{}/v1/transcription/never-happened/status",
            gateway.base_url
        ))
        .bearer_auth(TOKEN)
        .send()
        .await
        .expect("send status");
    assert_eq!(response.status(), 404);
    let body: ErrorResponse = response.json().await.expect("error body");
    assert!(body.error.contains("never-happened"));
}
