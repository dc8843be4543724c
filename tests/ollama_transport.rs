//! Ollama transport contract tests.
//!
//! These tests run the transport against a mock `/api/generate` endpoint and
//! verify:
//! - the request body matches the generate API
//! - NDJSON responses become ordered text fragments
//! - HTTP errors, error objects and truncated bodies are surfaced

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use futures_util::StreamExt;
use serde_json::json;
use vtalk::error::ChatError;
use vtalk::llm::{OllamaTransport, TextGenerator};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ndjson(lines: &[serde_json::Value]) -> String {
    lines.iter().map(|l| format!("{l}\n")).collect()
}

async fn collect(transport: &OllamaTransport, prompt: &str) -> Vec<Result<String, ChatError>> {
    let stream = transport.stream(prompt).await.unwrap();
    stream.collect().await
}

// ────────────────────────────────────────────────────────────────────────────
// Request format
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_request_body_matches_generate_api() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_json(json!({
            "model": "qwen2.5",
            "prompt": "User: Hello\nAssistant:",
            "stream": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(ndjson(&[
            json!({"response": "", "done": true}),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let transport = OllamaTransport::new(server.uri(), "qwen2.5");
    let items = collect(&transport, "User: Hello\nAssistant:").await;
    assert!(items.is_empty());
}

// ────────────────────────────────────────────────────────────────────────────
// Streaming
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fragments_arrive_in_order() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ndjson(&[
            json!({"model": "qwen2.5", "response": "Hi", "done": false}),
            json!({"model": "qwen2.5", "response": " there", "done": false}),
            json!({"model": "qwen2.5", "response": "", "done": true, "eval_count": 2}),
        ])))
        .mount(&server)
        .await;

    let transport = OllamaTransport::new(server.uri(), "qwen2.5");
    let texts: Vec<String> = collect(&transport, "p")
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(texts, vec!["Hi", " there"]);
}

#[tokio::test]
async fn test_generate_collects_full_text() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ndjson(&[
            json!({"response": "Happy", "done": false}),
            json!({"response": "", "done": true}),
        ])))
        .mount(&server)
        .await;

    let transport = OllamaTransport::new(format!("{}/", server.uri()), "qwen2.5");
    assert_eq!(transport.generate("classify").await.unwrap(), "Happy");
}

#[tokio::test]
async fn test_malformed_lines_are_skipped() {
    let server = MockServer::start().await;

    let body = format!(
        "{}garbage line\n\n{}",
        ndjson(&[json!({"response": "a", "done": false})]),
        ndjson(&[json!({"response": "b", "done": true})]),
    );
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let transport = OllamaTransport::new(server.uri(), "qwen2.5");
    assert_eq!(transport.generate("p").await.unwrap(), "ab");
}

// ────────────────────────────────────────────────────────────────────────────
// Failures
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_http_error_fails_to_open() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"error": "model 'nope' not found"})),
        )
        .mount(&server)
        .await;

    let transport = OllamaTransport::new(server.uri(), "nope");
    let err = match transport.stream("p").await {
        Ok(_) => panic!("expected open failure"),
        Err(e) => e,
    };
    assert!(matches!(err, ChatError::Transport(_)));
    assert!(err.message().contains("404"));
    assert!(err.message().contains("model 'nope' not found"));
}

#[tokio::test]
async fn test_connection_refused_fails_to_open() {
    // Nothing listens on port 1.
    let transport = OllamaTransport::new("http://127.0.0.1:1", "qwen2.5");
    let result = transport.stream("p").await;
    assert!(matches!(result, Err(ChatError::Transport(_))));
}

#[tokio::test]
async fn test_error_object_mid_stream() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ndjson(&[
            json!({"response": "Hi", "done": false}),
            json!({"error": "out of memory"}),
        ])))
        .mount(&server)
        .await;

    let transport = OllamaTransport::new(server.uri(), "qwen2.5");
    let items = collect(&transport, "p").await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap(), "Hi");
    match &items[1] {
        Err(ChatError::Stream(m)) => assert_eq!(m, "out of memory"),
        other => panic!("expected stream error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_truncated_body_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ndjson(&[
            json!({"response": "Hi", "done": false}),
        ])))
        .mount(&server)
        .await;

    let transport = OllamaTransport::new(server.uri(), "qwen2.5");
    let err = transport.generate("p").await.unwrap_err();
    assert!(matches!(err, ChatError::Stream(_)));
}
