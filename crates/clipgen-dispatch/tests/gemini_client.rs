//! Gemini client tests against a mock HTTP server.

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use clipgen_dispatch::{
    classify, FailureClass, GeminiClient, GeminiConfig, UpstreamClient, UpstreamErrorKind,
};

const ENDPOINT: &str = "/v1beta/models/gemini-test:generateContent";

fn client_for(server: &MockServer) -> GeminiClient {
    GeminiClient::new(
        GeminiConfig::default()
            .with_api_base(format!("{}/v1beta", server.uri()))
            .with_model("gemini-test"),
    )
    .unwrap()
}

fn error_body(code: u16, status: &str, message: &str) -> serde_json::Value {
    json!({ "error": { "code": code, "message": message, "status": status } })
}

#[tokio::test]
async fn test_success_concatenates_text_parts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(query_param("key", "secret-1"))
        .and(body_partial_json(json!({
            "contents": [{ "parts": [{ "text": "find clips" }] }],
            "generationConfig": { "responseMimeType": "application/json" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "[{\"start\":" }, { "text": "\"00:01\",\"end\":\"00:09\"}]" }] }
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let text = client_for(&server)
        .generate("secret-1", "find clips")
        .await
        .unwrap();
    assert_eq!(text, r#"[{"start":"00:01","end":"00:09"}]"#);
}

#[tokio::test]
async fn test_quota_response_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(429).set_body_json(error_body(
            429,
            "RESOURCE_EXHAUSTED",
            "Quota exceeded for quota metric 'Generate Content API requests per minute'",
        )))
        .mount(&server)
        .await;

    let err = client_for(&server).generate("secret-1", "p").await.unwrap_err();
    assert_eq!(err.kind, UpstreamErrorKind::Http);
    assert_eq!(err.status, Some(429));
    assert!(err.message.starts_with("RESOURCE_EXHAUSTED"));
    assert_eq!(classify(&err), FailureClass::QuotaExceeded);
}

#[tokio::test]
async fn test_unknown_model_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(404).set_body_json(error_body(
            404,
            "NOT_FOUND",
            "models/gemini-test is not found for API version v1beta",
        )))
        .mount(&server)
        .await;

    let err = client_for(&server).generate("secret-1", "p").await.unwrap_err();
    assert_eq!(classify(&err), FailureClass::ModelNotFound);
}

#[tokio::test]
async fn test_invalid_key_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(400).set_body_json(error_body(
            400,
            "INVALID_ARGUMENT",
            "API key not valid. Please pass a valid API key.",
        )))
        .mount(&server)
        .await;

    let err = client_for(&server).generate("secret-1", "p").await.unwrap_err();
    assert_eq!(classify(&err), FailureClass::CredentialInvalid);
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend unavailable"))
        .mount(&server)
        .await;

    let err = client_for(&server).generate("secret-1", "p").await.unwrap_err();
    assert_eq!(err.message, "backend unavailable");
    assert_eq!(classify(&err), FailureClass::Transient);
}

#[tokio::test]
async fn test_missing_candidates_is_empty_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .mount(&server)
        .await;

    let err = client_for(&server).generate("secret-1", "p").await.unwrap_err();
    assert_eq!(err.kind, UpstreamErrorKind::EmptyResponse);
    assert_eq!(classify(&err), FailureClass::Transient);
}

#[tokio::test]
async fn test_transport_error_hides_secret() {
    let client = GeminiClient::new(
        GeminiConfig::default().with_api_base("http://127.0.0.1:1/v1beta"),
    )
    .unwrap();

    let err = client.generate("very-secret-key", "p").await.unwrap_err();
    assert_eq!(err.kind, UpstreamErrorKind::Transport);
    assert!(!err.to_string().contains("very-secret-key"));
}
