//! Integration tests for the OpenRouter client against a mock server.

use std::sync::Arc;

use chatline_completion::{OpenRouterClient, list_schema};
use chatline_core::{
    ChatMessage, ChatRole, ClientConfig, CompletionError, CompletionRequest, CompletionService,
    CredentialProvider,
};
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Key(Option<&'static str>);

impl CredentialProvider for Key {
    fn credential(&self) -> Option<SecretString> {
        self.0.map(|k| SecretString::from(k.to_string()))
    }
}

fn client(server: &MockServer, key: Option<&'static str>) -> OpenRouterClient {
    let config = ClientConfig::default().with_base_url(server.uri());
    OpenRouterClient::new(config, Arc::new(Key(key))).unwrap()
}

fn hello_request() -> CompletionRequest {
    CompletionRequest {
        messages: vec![ChatMessage {
            role: ChatRole::User,
            content: "Hello".to_string(),
        }],
        model: "openai/gpt-4".to_string(),
        response_format: None,
    }
}

#[tokio::test]
async fn test_successful_completion() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(header("x-title", "chatline"))
        .and(body_partial_json(json!({
            "model": "openai/gpt-4",
            "messages": [{"role": "user", "content": "Hello"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "gen-1",
            "created": 1_700_000_000,
            "model": "openai/gpt-4",
            "choices": [{"message": {"role": "assistant", "content": "Hi there"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server, Some("sk-test"))
        .complete(hello_request())
        .await
        .unwrap();

    assert_eq!(response.first_message().unwrap().content, "Hi there");
    assert_eq!(response.id.as_deref(), Some("gen-1"));
}

#[tokio::test]
async fn test_missing_credential_skips_network() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = client(&server, None)
        .complete(hello_request())
        .await
        .unwrap_err();

    assert_eq!(err, CompletionError::MissingCredential);
}

#[tokio::test]
async fn test_error_status_carries_service_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"message": "No auth credentials found", "code": 401}
        })))
        .mount(&server)
        .await;

    let err = client(&server, Some("sk-bad"))
        .complete(hello_request())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        CompletionError::request_failed("No auth credentials found")
    );
}

#[tokio::test]
async fn test_error_status_without_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = client(&server, Some("sk-test"))
        .complete(hello_request())
        .await
        .unwrap_err();

    let CompletionError::RequestFailed { reason: Some(reason) } = err else {
        panic!("expected a request failure with reason");
    };
    assert!(reason.contains("502"), "{reason}");
}

#[tokio::test]
async fn test_malformed_body_is_request_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
        .mount(&server)
        .await;

    let err = client(&server, Some("sk-test"))
        .complete(hello_request())
        .await
        .unwrap_err();

    assert!(matches!(err, CompletionError::RequestFailed { .. }));
}

#[tokio::test]
async fn test_empty_choices_is_request_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let err = client(&server, Some("sk-test"))
        .complete(hello_request())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        CompletionError::request_failed("Response contained no choices")
    );
}

#[tokio::test]
async fn test_schema_sent_as_response_format() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "response_format": {"type": "json_schema", "json_schema": {"name": "list", "strict": true}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"items\":[\"a\"]}"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut request = hello_request();
    request.response_format = Some(list_schema());

    let response = client(&server, Some("sk-test"))
        .complete(request)
        .await
        .unwrap();

    assert_eq!(response.first_message().unwrap().content, r#"{"items":["a"]}"#);
}

#[tokio::test]
async fn test_referer_header_when_configured() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(header("http-referer", "http://localhost:3000/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "ok"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = ClientConfig::default().with_base_url(server.uri());
    config.referer = Some("http://localhost:3000/".to_string());
    let client = OpenRouterClient::new(config, Arc::new(Key(Some("sk-test")))).unwrap();

    client.complete(hello_request()).await.unwrap();
}
