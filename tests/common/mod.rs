//! Shared test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use brief_gateway::config::{BackendConfig, Config};
use brief_gateway::voice::{SpeechRequest, SpeechSink};
use brief_gateway::{BackendClient, Broadcaster, TurnRouter};
use serde_json::{Value, json};

/// How the fake backend answers one request
#[derive(Debug, Clone)]
pub enum Script {
    /// Respond with this status and no stream
    Status(u16),
    /// Stream these lines, newline-terminated
    Lines(Vec<String>),
    /// Stream these lines, then break the connection
    Broken(Vec<String>),
    /// Wait this long before answering with an empty stream
    Stall(Duration),
    /// Echo the message back as a reply carrying a document update
    Echo(Duration),
}

impl Script {
    /// Data frames for the given tokens
    pub fn tokens(tokens: &[&str]) -> Self {
        Self::Lines(
            tokens
                .iter()
                .map(|t| format!("data: {}", json!({ "token": t })))
                .collect(),
        )
    }
}

/// A recorded backend request
#[derive(Debug, Clone)]
pub struct Recorded {
    pub body: Value,
    pub accept: Option<String>,
}

struct Fake {
    script: Vec<Script>,
    requests: Mutex<Vec<Recorded>>,
}

/// Local streaming backend that answers requests from a script
pub struct FakeBackend {
    pub url: String,
    fake: Arc<Fake>,
}

impl FakeBackend {
    /// Requests received so far
    pub fn requests(&self) -> Vec<Recorded> {
        self.fake.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.fake.requests.lock().unwrap().len()
    }

    /// `user_context.language` of every request, in order
    pub fn languages(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| r.body["user_context"]["language"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Backend configuration pointing at this server with fast retries
    pub fn config(&self) -> BackendConfig {
        BackendConfig {
            url: self.url.clone(),
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(2),
            backoff_base: Duration::from_millis(10),
            source: "brief-test".to_string(),
        }
    }

    pub fn client(&self) -> BackendClient {
        BackendClient::new(&self.config())
    }
}

/// Start a fake backend; request `n` is answered by `script[n]`, or by the
/// last entry once the script runs out
pub async fn spawn_backend(script: Vec<Script>) -> FakeBackend {
    assert!(!script.is_empty(), "script needs at least one entry");
    let fake = Arc::new(Fake {
        script,
        requests: Mutex::new(Vec::new()),
    });

    let app = Router::new()
        .route("/stream", post(handle))
        .with_state(Arc::clone(&fake));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeBackend {
        url: format!("http://{addr}/stream"),
        fake,
    }
}

async fn handle(State(fake): State<Arc<Fake>>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    let step = {
        let mut requests = fake.requests.lock().unwrap();
        let index = requests.len().min(fake.script.len() - 1);
        requests.push(Recorded {
            body: body.clone(),
            accept: headers
                .get(header::ACCEPT)
                .and_then(|v| v.to_str().ok())
                .map(String::from),
        });
        fake.script[index].clone()
    };

    match step {
        Script::Status(code) => StatusCode::from_u16(code).unwrap().into_response(),
        Script::Lines(lines) => event_stream(Body::from(join_lines(&lines))),
        Script::Broken(lines) => {
            let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
                Ok(Bytes::from(join_lines(&lines))),
                Err(std::io::Error::other("connection reset")),
            ];
            event_stream(Body::from_stream(futures::stream::iter(chunks)))
        }
        Script::Stall(delay) => {
            tokio::time::sleep(delay).await;
            event_stream(Body::empty())
        }
        Script::Echo(delay) => {
            tokio::time::sleep(delay).await;
            let message = body["message"].as_str().unwrap_or_default();
            let update = json!({ "project": { "title": message } });
            let lines = vec![
                format!("data: {}", json!({ "token": "You said " })),
                format!("data: {}", json!({ "token": message })),
                format!("data: {}", json!({ "token": format!("\n```document\n{update}\n```") })),
            ];
            event_stream(Body::from(join_lines(&lines)))
        }
    }
}

fn join_lines(lines: &[String]) -> String {
    lines.iter().map(|l| format!("{l}\n")).collect()
}

fn event_stream(body: Body) -> Response {
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

/// Speech sink that records what it was asked to render
#[derive(Default)]
pub struct RecordingSpeech {
    requests: Mutex<Vec<SpeechRequest>>,
}

impl RecordingSpeech {
    pub fn requests(&self) -> Vec<SpeechRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSink for RecordingSpeech {
    async fn render(&self, request: &SpeechRequest) -> brief_gateway::Result<()> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }
}

/// Gateway configuration with a small voice table
pub fn test_config(backend: &FakeBackend) -> Config {
    let mut config = Config::default();
    config.backend = backend.config();
    config.voice.voices = [("en", "voice-en"), ("nl", "voice-nl")]
        .into_iter()
        .map(|(l, v)| (l.to_string(), v.to_string()))
        .collect();
    config
}

/// Router wired to `backend` with a recording speech sink
pub fn test_router(backend: &FakeBackend) -> (Arc<TurnRouter>, Arc<RecordingSpeech>) {
    let speech = Arc::new(RecordingSpeech::default());
    let router = TurnRouter::new(
        &test_config(backend),
        Arc::new(backend.client()),
        Arc::new(Broadcaster::new()),
        Arc::clone(&speech) as Arc<dyn SpeechSink>,
    );
    (Arc::new(router), speech)
}
