//! WebSocket server end-to-end tests.
//!
//! A real [`ChatServer`] is started on an ephemeral port with a mock Ollama
//! backend, and a `tokio-tungstenite` client talks to it over the wire.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use vtalk::config::AppConfig;
use vtalk::error::{ChatError, Result};
use vtalk::llm::{FragmentStream, TextGenerator};
use vtalk::pipeline::TurnSequencer;
use vtalk::server::ChatServer;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Sets its flag when dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Yields one fragment, then never finishes. Flags when its stream is dropped.
struct StallingGenerator {
    dropped: Arc<AtomicBool>,
}

#[async_trait]
impl TextGenerator for StallingGenerator {
    fn name(&self) -> &str {
        "stalling"
    }

    async fn stream(&self, _prompt: &str) -> Result<FragmentStream> {
        let flag = DropFlag(Arc::clone(&self.dropped));
        Ok(Box::pin(async_stream::stream! {
            let _flag = flag;
            yield Ok::<_, ChatError>("Hi".to_owned());
            std::future::pending::<()>().await;
        }))
    }
}

/// Mock Ollama: replies "Hi there" to chat prompts and "Sad" to
/// classification prompts.
async fn mock_ollama() -> MockServer {
    mock_ollama_with_delay(Duration::ZERO).await
}

/// Like [`mock_ollama`], but chat replies start after `delay`.
async fn mock_ollama_with_delay(delay: Duration) -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_string_contains("Emotion:"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "{\"response\":\"Sad\",\"done\":false}\n{\"response\":\"\",\"done\":true}\n",
        ))
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(
                    "{\"response\":\"Hi\",\"done\":false}\n\
                     {\"response\":\" there\",\"done\":false}\n\
                     {\"response\":\"\",\"done\":true}\n",
                )
                .set_delay(delay),
        )
        .mount(&server)
        .await;

    server
}

async fn start_server(backend: &MockServer) -> ChatServer {
    let mut config = AppConfig::default();
    config.server.port = 0;
    config.llm.api_url = backend.uri();
    config.emotions.allowed = vec!["Happy".into(), "Sad".into()];
    config.prepare().unwrap();

    let config = Arc::new(config);
    let sequencer = Arc::new(TurnSequencer::from_config(&config).unwrap());
    ChatServer::start(config, sequencer).await.unwrap()
}

async fn connect(server: &ChatServer) -> Client {
    let url = format!("ws://{}/ws", server.addr());
    let (client, _) = connect_async(url).await.unwrap();
    client
}

async fn next_frame(client: &mut Client) -> Option<Message> {
    tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("timed out waiting for frame")
        .map(|r| r.unwrap())
}

async fn next_json(client: &mut Client) -> Value {
    loop {
        match next_frame(client).await {
            Some(Message::Text(text)) => return serde_json::from_str(&text).unwrap(),
            Some(Message::Ping(_) | Message::Pong(_)) => continue,
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

/// Read events until `end` or `error`.
async fn read_turn(client: &mut Client) -> Vec<Value> {
    let mut events = Vec::new();
    loop {
        let event = next_json(client).await;
        let done = matches!(event["type"].as_str(), Some("end" | "error"));
        events.push(event);
        if done {
            return events;
        }
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let backend = mock_ollama().await;
    let server = start_server(&backend).await;

    let body = reqwest::get(format!("http://{}/health", server.addr()))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_full_turn_over_websocket() {
    let backend = mock_ollama().await;
    let server = start_server(&backend).await;
    let mut client = connect(&server).await;

    client.send(Message::Text("Hello".into())).await.unwrap();
    let events = read_turn(&mut client).await;

    assert_eq!(
        events,
        vec![
            json!({"type": "start"}),
            json!({"type": "chunk", "data": "Hi"}),
            json!({"type": "chunk", "data": " there"}),
            json!({"type": "emotion", "emotion": "Sad"}),
            json!({"type": "end"}),
        ]
    );
}

#[tokio::test]
async fn test_prompt_object_and_history() {
    let backend = mock_ollama().await;
    let server = start_server(&backend).await;
    let mut client = connect(&server).await;

    client
        .send(Message::Text(r#"{"prompt":"Hello"}"#.into()))
        .await
        .unwrap();
    read_turn(&mut client).await;
    client
        .send(Message::Text("\"How are you?\"".into()))
        .await
        .unwrap();
    let events = read_turn(&mut client).await;
    assert_eq!(events.last().unwrap()["type"], "end");

    let requests = backend.received_requests().await.unwrap();
    let chat_prompts: Vec<String> = requests
        .iter()
        .map(|r| serde_json::from_slice::<Value>(&r.body).unwrap())
        .filter_map(|b| b["prompt"].as_str().map(str::to_owned))
        .filter(|p| !p.ends_with("Emotion:"))
        .collect();
    assert_eq!(chat_prompts.len(), 2);
    assert!(chat_prompts[1].contains("User: Hello\nAssistant: Hi there\nUser: How are you?\nAssistant:"));
}

#[tokio::test]
async fn test_protocol_errors_keep_connection_open() {
    let backend = mock_ollama().await;
    let server = start_server(&backend).await;
    let mut client = connect(&server).await;

    client
        .send(Message::Text(r#"{"text":"hi"}"#.into()))
        .await
        .unwrap();
    let event = next_json(&mut client).await;
    assert_eq!(event["type"], "error");

    client.send(Message::Text("   ".into())).await.unwrap();
    assert_eq!(
        next_json(&mut client).await,
        json!({"type": "error", "message": "Empty prompt"})
    );

    client
        .send(Message::Binary(vec![1, 2, 3].into()))
        .await
        .unwrap();
    assert_eq!(next_json(&mut client).await["type"], "error");

    client.send(Message::Text("Hello".into())).await.unwrap();
    let events = read_turn(&mut client).await;
    assert_eq!(events.first().unwrap()["type"], "start");
    assert_eq!(events.last().unwrap()["type"], "end");
}

#[tokio::test]
async fn test_backend_down_sends_error() {
    let mut config = AppConfig::default();
    config.server.port = 0;
    config.llm.api_url = "http://127.0.0.1:1".into();
    config.prepare().unwrap();
    let config = Arc::new(config);
    let sequencer = Arc::new(TurnSequencer::from_config(&config).unwrap());
    let server = ChatServer::start(config, sequencer).await.unwrap();
    let mut client = connect(&server).await;

    client.send(Message::Text("Hello".into())).await.unwrap();
    let events = read_turn(&mut client).await;

    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "error");
}

#[tokio::test]
async fn test_connections_are_independent() {
    let backend = mock_ollama().await;
    let server = start_server(&backend).await;
    let mut first = connect(&server).await;
    let mut second = connect(&server).await;

    first.send(Message::Text("Hello".into())).await.unwrap();
    second.send(Message::Text("Hi".into())).await.unwrap();

    let a = read_turn(&mut first).await;
    let b = read_turn(&mut second).await;
    assert_eq!(a.last().unwrap()["type"], "end");
    assert_eq!(b.last().unwrap()["type"], "end");
}

#[tokio::test]
async fn test_shutdown_closes_clients() {
    let backend = mock_ollama().await;
    let mut server = start_server(&backend).await;
    let mut client = connect(&server).await;

    server.shutdown();
    match next_frame(&mut client).await {
        Some(Message::Close(_)) | None => {}
        other => panic!("expected close, got {other:?}"),
    }
    tokio::time::timeout(Duration::from_secs(5), server.wait())
        .await
        .expect("server did not stop");
}

#[tokio::test]
async fn test_prompt_during_turn_is_rejected() {
    let backend = mock_ollama_with_delay(Duration::from_millis(500)).await;
    let server = start_server(&backend).await;
    let mut client = connect(&server).await;

    client.send(Message::Text("Hello".into())).await.unwrap();
    client.send(Message::Text("Again".into())).await.unwrap();

    let mut events = Vec::new();
    loop {
        let event = next_json(&mut client).await;
        let done = event["type"] == "end";
        events.push(event);
        if done {
            break;
        }
    }

    let errors: Vec<&Value> = events.iter().filter(|e| e["type"] == "error").collect();
    assert_eq!(
        errors,
        vec![&json!({
            "type": "error",
            "message": "A reply is still in progress; wait for it to finish"
        })]
    );
    let turn: Vec<&str> = events
        .iter()
        .filter(|e| e["type"] != "error")
        .map(|e| e["type"].as_str().unwrap())
        .collect();
    assert_eq!(turn, vec!["start", "chunk", "chunk", "emotion", "end"]);

    let requests = backend.received_requests().await.unwrap();
    let bodies: Vec<Value> = requests
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    assert!(bodies.iter().all(|b| !b["prompt"].as_str().unwrap().contains("User: Again")));
}

#[tokio::test]
async fn test_disconnect_mid_turn_cancels_generation() {
    let mut config = AppConfig::default();
    config.server.port = 0;
    config.emotions.allowed = vec!["Happy".into(), "Sad".into()];
    config.prepare().unwrap();

    let dropped = Arc::new(AtomicBool::new(false));
    let generator = Arc::new(StallingGenerator {
        dropped: Arc::clone(&dropped),
    });
    let sequencer = TurnSequencer::new(generator, None, &config);
    let server = ChatServer::start(Arc::new(config), Arc::new(sequencer))
        .await
        .unwrap();
    let mut client = connect(&server).await;

    client.send(Message::Text("Hello".into())).await.unwrap();
    assert_eq!(next_json(&mut client).await, json!({"type": "start"}));
    assert_eq!(next_json(&mut client).await, json!({"type": "chunk", "data": "Hi"}));
    assert!(!dropped.load(Ordering::SeqCst));

    client.close(None).await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while !dropped.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("generation stream was not dropped after disconnect");
}
