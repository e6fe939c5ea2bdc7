//! Session lifecycle and inbound event endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{ApiError, ApiState};
use crate::session::{DocumentPatch, SessionSnapshot};
use crate::utterance::InboundEvent;

/// Open session request
#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    /// Session id; generated when absent
    #[serde(default)]
    pub session_id: Option<String>,
    /// Initial language
    #[serde(default)]
    pub language: Option<String>,
}

/// Open session response
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

/// Accepted event response
#[derive(Debug, Serialize)]
pub struct EventAccepted {
    pub session_id: String,
    pub turn_id: Uuid,
}

/// Event submission options
#[derive(Debug, Default, Deserialize)]
pub struct EventQuery {
    /// Hold the response until the turn is processed
    #[serde(default)]
    pub wait: bool,
}

/// Document update response
#[derive(Debug, Serialize)]
pub struct DocumentUpdated {
    /// Fields that changed; cleared fields are `null`
    pub updates: DocumentPatch,
    pub changed: usize,
}

/// Build the sessions router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/{id}", get(get_session).delete(end_session))
        .route("/sessions/{id}/events", post(post_event))
        .route("/sessions/{id}/document", post(update_document))
        .with_state(state)
}

/// Generate a session id of the form `session-xxxxxxxx`
fn generate_session_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("session-{}", &id[..8])
}

async fn create_session(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    let session_id = request
        .session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(generate_session_id);

    let handle = state
        .turns
        .open_session(session_id, request.language)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: handle.id().to_string(),
        }),
    ))
}

async fn list_sessions(State(state): State<Arc<ApiState>>) -> Json<Vec<String>> {
    Json(state.turns.session_ids().await)
}

async fn get_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let handle = state.turns.session(&id).await?;
    Ok(Json(handle.snapshot().await?))
}

async fn end_session(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.turns.close_session(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn post_event(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Query(query): Query<EventQuery>,
    Json(event): Json<InboundEvent>,
) -> Result<Response, ApiError> {
    let ticket = state.turns.route(&id, event).await?;

    if query.wait {
        let outcome = ticket.outcome().await?;
        return Ok(Json(outcome).into_response());
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(EventAccepted {
            session_id: id,
            turn_id: ticket.turn_id(),
        }),
    )
        .into_response())
}

async fn update_document(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(partial): Json<Value>,
) -> Result<Json<DocumentUpdated>, ApiError> {
    let handle = state.turns.session(&id).await?;
    let updates = handle.update_document(partial).await?;
    Ok(Json(DocumentUpdated {
        changed: updates.len(),
        updates,
    }))
}
