//! HTTP route handlers for the API.

use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mnemo_common::ChatTurn;
use mnemo_engine::PERSONALITIES;
use mnemo_memory::Memory;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

const DEFAULT_USER: &str = "default_user";
const DEFAULT_PERSONALITY: &str = "default";

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
    })
}

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, Json(self)).into_response()
    }
}

fn storage_error(e: mnemo_common::MnemoError) -> ErrorResponse {
    error!(error = %e, "Request failed");
    ErrorResponse {
        error: format!("Request failed: {e}"),
        code: "STORAGE_ERROR",
    }
}

#[derive(Debug, Serialize)]
pub struct PersonalityInfo {
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PersonalitiesResponse {
    pub personalities: HashMap<&'static str, PersonalityInfo>,
}

/// List available personalities.
pub async fn personalities() -> Json<PersonalitiesResponse> {
    let personalities = PERSONALITIES
        .iter()
        .map(|p| {
            (
                p.key,
                PersonalityInfo {
                    name: p.name,
                    description: p.description,
                },
            )
        })
        .collect();
    Json(PersonalitiesResponse { personalities })
}

/// Chat request body.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatTurn>,
    #[serde(default)]
    pub personality: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
}

/// Chat response body.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub memory: Memory,
}

/// Run one chat turn: reconcile memory and generate a styled reply.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ErrorResponse> {
    let user = request.user_name.as_deref().unwrap_or(DEFAULT_USER);
    let personality = request
        .personality
        .as_deref()
        .unwrap_or(DEFAULT_PERSONALITY);

    info!(
        user = %user,
        personality = %personality,
        turns = request.messages.len(),
        "Chat request"
    );

    let outcome = state
        .engine
        .chat(user, &request.messages, personality)
        .await
        .map_err(storage_error)?;

    Ok(Json(ChatResponse {
        response: outcome.response,
        memory: outcome.memory,
    }))
}

/// Extract-memory request body.
#[derive(Debug, Deserialize)]
pub struct ExtractMemoryRequest {
    pub messages: Vec<ChatTurn>,
    #[serde(default)]
    pub user_name: Option<String>,
}

/// Extract-memory response: the extracted records plus a readable
/// summary.
#[derive(Debug, Serialize)]
pub struct ExtractMemoryResponse {
    #[serde(flatten)]
    pub memory: Memory,
    pub summary: String,
}

/// Extract memory from a transcript and persist it.
pub async fn extract_memory(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExtractMemoryRequest>,
) -> Result<Json<ExtractMemoryResponse>, ErrorResponse> {
    let user = request.user_name.as_deref().unwrap_or(DEFAULT_USER);

    let outcome = state
        .engine
        .extract_and_store(user, &request.messages)
        .await
        .map_err(storage_error)?;

    Ok(Json(ExtractMemoryResponse {
        memory: outcome.memory,
        summary: outcome.summary,
    }))
}

/// Comparison request body.
#[derive(Debug, Deserialize)]
pub struct ComparisonRequest {
    pub messages: Vec<ChatTurn>,
    #[serde(default)]
    pub user_name: Option<String>,
}

/// Comparison response body.
#[derive(Debug, Serialize)]
pub struct ComparisonResponse {
    pub comparisons: HashMap<String, String>,
    pub memory_summary: String,
}

/// Generate a reply per personality for side-by-side comparison.
pub async fn compare(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ComparisonRequest>,
) -> Result<Json<ComparisonResponse>, ErrorResponse> {
    let user = request.user_name.as_deref().unwrap_or(DEFAULT_USER);

    let outcome = state
        .engine
        .compare(user, &request.messages)
        .await
        .map_err(storage_error)?;

    Ok(Json(ComparisonResponse {
        comparisons: outcome.comparisons,
        memory_summary: outcome.summary,
    }))
}

/// Read a user's stored memory, converged through the merge engine.
pub async fn get_memory(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> Result<Json<Memory>, ErrorResponse> {
    let memory = state.engine.memory(&user).await.map_err(storage_error)?;
    Ok(Json(memory))
}

/// Deletion response body.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

/// Delete everything stored for a user.
pub async fn delete_memory(
    State(state): State<Arc<AppState>>,
    Path(user): Path<String>,
) -> Result<Json<DeleteResponse>, ErrorResponse> {
    info!(user = %user, "Deleting stored memory");
    state.engine.forget(&user).await.map_err(storage_error)?;
    Ok(Json(DeleteResponse { deleted: true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy",
            version: "0.1.0",
            uptime_seconds: 100,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("uptime_seconds"));
    }

    #[test]
    fn test_chat_request_deserialization() {
        let json = r#"{"messages": [{"role": "user", "content": "Hello"}]}"#;
        let request: ChatRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.messages.len(), 1);
        assert!(request.personality.is_none());
        assert!(request.user_name.is_none());
    }

    #[test]
    fn test_chat_request_with_options() {
        let json = r#"{
            "messages": [{"role": "user", "content": "Hello"}],
            "personality": "therapist",
            "user_name": "alice"
        }"#;
        let request: ChatRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.personality.as_deref(), Some("therapist"));
        assert_eq!(request.user_name.as_deref(), Some("alice"));
    }

    #[test]
    fn test_extract_response_flattens_memory() {
        let response = ExtractMemoryResponse {
            memory: Memory::default(),
            summary: "No memory extracted yet.".into(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json["preferences"].is_array());
        assert!(json["emotional_patterns"].is_array());
        assert!(json["facts"].is_array());
        assert_eq!(json["summary"], "No memory extracted yet.");
    }
}
