//! API endpoint integration tests

use std::time::Duration;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use brief_gateway::TurnRouter;
use brief_gateway::api::ApiServer;
use futures::StreamExt;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tower::ServiceExt;

mod common;
use common::{Script, spawn_backend, test_router};

/// Build a test API router against a backend that echoes
async fn build_test_router() -> axum::Router {
    let backend = spawn_backend(vec![Script::Echo(Duration::ZERO)]).await;
    let (turns, _speech) = test_router(&backend);
    ApiServer::new(turns, 0).router()
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_test_router().await;
    let (status, body) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_create_session_generates_id() {
    let app = build_test_router().await;
    let (status, body) = send(&app, "POST", "/sessions", Some(json!({}))).await;

    assert_eq!(status, StatusCode::CREATED);
    let id = body["session_id"].as_str().unwrap();
    assert!(id.starts_with("session-"), "{id}");

    let (_, status_body) = send(&app, "GET", "/status", None).await;
    assert_eq!(status_body["sessions"], json!([id]));
}

#[tokio::test]
async fn test_duplicate_session_conflicts() {
    let app = build_test_router().await;
    let create = json!({"session_id": "s-1", "language": "nl"});

    let (status, _) = send(&app, "POST", "/sessions", Some(create.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, "POST", "/sessions", Some(create)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "session_exists");
}

#[tokio::test]
async fn test_event_is_accepted_with_turn_id() {
    let app = build_test_router().await;
    send(&app, "POST", "/sessions", Some(json!({"session_id": "s-1"}))).await;

    let (status, body) = send(
        &app,
        "POST",
        "/sessions/s-1/events",
        Some(json!({"channel": "voice", "text": "hello", "language": "nl"})),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["session_id"], "s-1");
    assert!(body["turn_id"].is_string());
}

#[tokio::test]
async fn test_event_wait_returns_outcome() {
    let app = build_test_router().await;
    send(&app, "POST", "/sessions", Some(json!({"session_id": "s-1"}))).await;

    let (status, body) = send(
        &app,
        "POST",
        "/sessions/s-1/events?wait=true",
        Some(json!({"channel": "text", "text": "Product teaser"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], "You said Product teaser");
    assert_eq!(body["language"], "en");
    assert_eq!(body["voice"], "voice-en");
    assert_eq!(body["fallback"], false);
    assert_eq!(body["document_changes"], 1);

    let (status, snapshot) = send(&app, "GET", "/sessions/s-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["phase"], "active");
    assert_eq!(snapshot["turns"], 1);
    assert_eq!(snapshot["document"]["project"]["title"], "Product teaser");
}

#[tokio::test]
async fn test_blank_event_is_rejected() {
    let app = build_test_router().await;
    send(&app, "POST", "/sessions", Some(json!({"session_id": "s-1"}))).await;

    let (status, body) = send(
        &app,
        "POST",
        "/sessions/s-1/events",
        Some(json!({"channel": "text", "text": "   "})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "empty_utterance");
}

#[tokio::test]
async fn test_event_for_unknown_session_is_not_found() {
    let app = build_test_router().await;
    let (status, body) = send(
        &app,
        "POST",
        "/sessions/nope/events",
        Some(json!({"channel": "text", "text": "hi"})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "session_not_found");
}

#[tokio::test]
async fn test_document_update_reports_changes() {
    let app = build_test_router().await;
    send(&app, "POST", "/sessions", Some(json!({"session_id": "s-1"}))).await;

    let (status, body) = send(
        &app,
        "POST",
        "/sessions/s-1/document",
        Some(json!({
            "budget": {"range": "10-20k", "currency": "EUR"},
            "catering": {"lunch": "yes"},
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], 2);
    assert_eq!(body["updates"], json!({"budget": {"range": "10-20k", "currency": "EUR"}}));
}

#[tokio::test]
async fn test_end_session() {
    let app = build_test_router().await;
    send(&app, "POST", "/sessions", Some(json!({"session_id": "s-1"}))).await;

    let (status, _) = send(&app, "DELETE", "/sessions/s-1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "GET", "/sessions/s-1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "DELETE", "/sessions/s-1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Serve the API on an ephemeral port
async fn serve(turns: Arc<TurnRouter>) -> SocketAddr {
    let app = ApiServer::new(turns, 0).router();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Next data frame from the socket, skipping pings
async fn next_frame(ws: &mut Socket) -> Option<Message> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(msg)) => return Some(msg),
                Some(Err(_)) | None => return None,
            }
        }
    })
    .await
    .expect("timed out waiting for websocket frame")
}

async fn next_envelope(ws: &mut Socket) -> Value {
    match next_frame(ws).await {
        Some(Message::Text(text)) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn test_observer_socket_streams_envelopes_until_session_ends() {
    let backend = spawn_backend(vec![Script::Echo(Duration::ZERO)]).await;
    let (turns, _speech) = test_router(&backend);
    let addr = serve(Arc::clone(&turns)).await;

    let session = turns.open_session("s-1", None).await.unwrap();
    let (mut ws, _) = connect_async(format!("ws://{addr}/sessions/s-1/observe"))
        .await
        .expect("failed to connect");

    session.text_message("Teaser").await.unwrap().outcome().await.unwrap();

    let transcript = next_envelope(&mut ws).await;
    assert_eq!(transcript["session_id"], "s-1");
    assert_eq!(transcript["topic"], "transcript");
    assert_eq!(transcript["payload"]["text"], "Teaser");

    let reply = next_envelope(&mut ws).await;
    assert_eq!(reply["topic"], "reply");
    assert_eq!(reply["payload"]["text"], "You said Teaser");
    assert!(reply["seq"].as_u64().unwrap() > transcript["seq"].as_u64().unwrap());

    let update = next_envelope(&mut ws).await;
    assert_eq!(update["topic"], "document-update");
    assert_eq!(update["payload"]["updates"]["project"]["title"], "Teaser");

    turns.close_session("s-1").await.unwrap();
    assert!(matches!(next_frame(&mut ws).await, Some(Message::Close(_)) | None));
}

#[tokio::test]
async fn test_observer_socket_for_unknown_session_is_refused() {
    let backend = spawn_backend(vec![Script::Echo(Duration::ZERO)]).await;
    let (turns, _speech) = test_router(&backend);
    let addr = serve(turns).await;

    let result = connect_async(format!("ws://{addr}/sessions/nope/observe")).await;
    assert!(result.is_err());
}
