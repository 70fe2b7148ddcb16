#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::oneshot;

pub type TestResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MockChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct MockCompletionRequest {
    model: String,
    messages: Vec<MockChatMessage>,
}

#[derive(Clone)]
struct MockServerState {
    requests: Arc<Mutex<Vec<Vec<MockChatMessage>>>>,
}

/// Deterministic stand-in for a chat-completions endpoint.
///
/// - synthesis prompts get `SUMMARY: <context>`
/// - worker prompts get a JSON result carrying one confident opportunity
/// - role prompts (`You are the <role>.`) get `[<role>] <context>`
/// - anything else is echoed back
pub fn mock_reply(messages: &[MockChatMessage]) -> String {
    let system = messages
        .iter()
        .find(|m| m.role == "system")
        .map(|m| m.content.as_str())
        .unwrap_or_default();
    let user = messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .unwrap_or_default();

    if system.contains("executive summary") {
        return format!("SUMMARY: {}", user);
    }
    if system.contains("Reply with a single JSON object") {
        return json!({
            "success": true,
            "message": "scanned feeds",
            "insights": [{"type": "opportunity", "content": "Regional grant opens Monday", "confidence": 0.9}],
            "action_items": ["draft application"],
        })
        .to_string();
    }
    if let Some(rest) = system.strip_prefix("You are the ") {
        let role = rest.split('.').next().unwrap_or_default();
        return format!("[{}] {}", role, user);
    }
    user.to_string()
}

async fn mock_chat_completion(
    State(state): State<MockServerState>,
    Json(payload): Json<MockCompletionRequest>,
) -> Json<Value> {
    let content = mock_reply(&payload.messages);
    state
        .requests
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .push(payload.messages);
    Json(json!({
        "model": payload.model,
        "choices": [{
            "message": { "role": "assistant", "content": content }
        }]
    }))
}

pub struct MockLlmServer {
    pub port: u16,
    requests: Arc<Mutex<Vec<Vec<MockChatMessage>>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl MockLlmServer {
    pub async fn start() -> TestResult<Self> {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/v1/chat/completions", post(mock_chat_completion))
            .with_state(MockServerState {
                requests: Arc::clone(&requests),
            });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        Ok(Self {
            port,
            requests,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}/v1/chat/completions", self.port)
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

pub fn bind_not_permitted(err: &(dyn std::error::Error + Send + Sync)) -> bool {
    err.to_string().contains("Operation not permitted")
}
