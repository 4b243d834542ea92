//! `/api` route handlers.
//!
//! Every response carries `success` and, for failures, a `message`. JSON
//! request bodies are read as raw bytes so that malformed input gets the
//! same `{success: false, message}` shape as a missing field.

use axum::Json;
use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use super::server::SharedGateway;
use super::session::SessionId;
use crate::error::PlanError;
use crate::store::DeleteOutcome;
use crate::types::StudyGoal;

pub const KEY_INVALID_MESSAGE: &str = "Groq API key is not valid or not set";

/// A failed API call, rendered as `{success: false, message}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    /// Payload key reported as `null`, for endpoints whose clients expect it.
    null_field: Option<&'static str>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            null_field: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn with_null(mut self, field: &'static str) -> Self {
        self.null_field = Some(field);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "success": false, "message": self.message });
        if let Some(field) = self.null_field {
            body[field] = Value::Null;
        }
        (self.status, Json(body)).into_response()
    }
}

impl From<PlanError> for ApiError {
    fn from(err: PlanError) -> Self {
        let status = match err {
            PlanError::NoMaterials => StatusCode::BAD_REQUEST,
            PlanError::MissingApiKey { .. } | PlanError::Generation { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        ApiError::new(status, err.to_string()).with_null("plan")
    }
}

/// Parse a JSON object body; anything else counts as no data.
fn json_object(body: &[u8]) -> Option<Map<String, Value>> {
    match serde_json::from_slice(body) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn string_field<'a>(data: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

async fn require_valid_key(gw: &SharedGateway, null_field: &'static str) -> Result<(), ApiError> {
    let assistant = gw.assistant();
    if assistant.validates_key_per_request() && !assistant.is_api_key_valid().await {
        return Err(ApiError::bad_request(KEY_INVALID_MESSAGE).with_null(null_field));
    }
    Ok(())
}

/// `POST /api/upload`: multipart field `files`, one or more parts.
pub async fn upload(
    State(gw): State<SharedGateway>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let mut multipart = multipart.map_err(|e| {
        warn!(error = %e, "Upload is not a multipart request");
        ApiError::bad_request("No files in request")
    })?;

    let mut files: Vec<(String, Bytes)> = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(e.status(), e.body_text()))?
    {
        if field.name() != Some("files") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::new(e.status(), e.body_text()))?;
        files.push((filename, bytes));
    }

    match files.first() {
        None => return Err(ApiError::bad_request("No files in request")),
        Some((name, _)) if name.is_empty() => {
            return Err(ApiError::bad_request("No files selected"));
        }
        Some(_) => {}
    }

    let assistant = gw.assistant();
    let mut uploaded = Vec::with_capacity(files.len());
    for (filename, bytes) in &files {
        match assistant.ingest(filename, bytes).await {
            Ok(descriptor) => {
                info!(file = %filename, "Successfully processed file");
                uploaded.push(descriptor);
            }
            Err(e) => warn!(file = %filename, error = %e, "Failed to upload file"),
        }
    }

    if uploaded.is_empty() {
        return Err(ApiError::bad_request("No files were uploaded successfully"));
    }
    Ok(Json(json!({
        "success": true,
        "message": format!("Successfully uploaded {} file(s)", uploaded.len()),
        "files": uploaded,
    })))
}

/// `GET /api/files`: descriptors without content.
pub async fn list_files(State(gw): State<SharedGateway>) -> Json<Value> {
    let files = gw.assistant().list_files().await;
    Json(json!({ "success": true, "files": files }))
}

/// `POST /api/delete-file`: body `{filename}`.
pub async fn delete_file(
    State(gw): State<SharedGateway>,
    body: Bytes,
) -> Result<Json<DeleteOutcome>, ApiError> {
    let data = json_object(&body);
    let filename = data
        .as_ref()
        .and_then(|d| string_field(d, "filename"))
        .ok_or_else(|| ApiError::bad_request("No filename provided"))?;

    let store = gw.assistant().store();
    let path = store.resolve_delete_target(filename).map_err(|e| {
        warn!(filename, error = %e, "Rejected delete request");
        ApiError::bad_request("Invalid filename")
    })?;
    Ok(Json(store.delete(&path).await))
}

/// `POST /api/generate-plan`: body `{goal, deadline}`.
pub async fn generate_plan(
    State(gw): State<SharedGateway>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    require_valid_key(&gw, "plan").await?;

    let data =
        json_object(&body).ok_or_else(|| ApiError::bad_request("No data provided").with_null("plan"))?;
    let goal = StudyGoal::from_label(string_field(&data, "goal").unwrap_or("pass"));
    let deadline = string_field(&data, "deadline")
        .filter(|d| !d.is_empty())
        .ok_or_else(|| ApiError::bad_request("No deadline provided").with_null("plan"))?;

    let plan = gw.assistant().generate_plan(goal, deadline).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Study plan generated successfully",
        "plan": plan,
    })))
}

/// `POST /api/chat`: body `{message}`. Records the turn in the session log.
pub async fn chat(
    State(gw): State<SharedGateway>,
    session: SessionId,
    body: Bytes,
) -> Result<(SessionId, Json<Value>), ApiError> {
    require_valid_key(&gw, "response").await?;

    let data = json_object(&body);
    let message = data
        .as_ref()
        .and_then(|d| string_field(d, "message"))
        .ok_or_else(|| ApiError::bad_request("No message provided").with_null("response"))?;

    let history = gw.sessions().history(session.as_str()).await;
    let mut history = history.lock().await;
    let reply = gw.assistant().chat(&mut history, message).await;

    Ok((
        session,
        Json(json!({
            "success": true,
            "message": "Response generated successfully",
            "response": reply,
        })),
    ))
}

/// `GET /api/chat-history`
pub async fn chat_history(
    State(gw): State<SharedGateway>,
    session: SessionId,
) -> (SessionId, Json<Value>) {
    let history = gw.sessions().snapshot(session.as_str()).await;
    (session, Json(json!({ "success": true, "history": history })))
}

/// `POST /api/reset-chat`
pub async fn reset_chat(
    State(gw): State<SharedGateway>,
    session: SessionId,
) -> (SessionId, Json<Value>) {
    gw.sessions().reset(session.as_str()).await;
    (
        session,
        Json(json!({ "success": true, "message": "Chat history reset successfully" })),
    )
}
