//! Chat read HTTP handlers.
//!
//! Endpoints:
//! - GET /api/v1/chats                - Chats assigned to the calling operator
//! - GET /api/v1/chats/summaries      - Chat overview with latest message
//! - GET /api/v1/chats/{id}/messages  - Message history ordered by sequence

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};
use parley_types::chat::{Chat, ChatMessage, ChatSummary};
use serde::Deserialize;
use uuid::Uuid;

use crate::http::error::AppError;
use crate::http::extractors::claims::Caller;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Query parameters for message listing.
#[derive(Debug, Deserialize)]
pub struct MessageListQuery {
    #[serde(default = "default_message_limit")]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

fn default_message_limit() -> Option<i64> {
    Some(100)
}

/// Parse a UUID from a path parameter, returning a 400 error on invalid format.
fn parse_uuid(s: &str) -> Result<Uuid, AppError> {
    s.parse::<Uuid>()
        .map_err(|_| AppError::Validation(format!("Invalid UUID: {s}")))
}

/// GET /api/v1/chats
pub async fn list_chats(
    State(state): State<AppState>,
    Caller(claims): Caller,
) -> Result<Json<ApiResponse<Vec<Chat>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let chats = state.query_service.chats_for(&claims).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(chats, request_id, elapsed)
        .with_link("self", "/api/v1/chats")
        .with_link("summaries", "/api/v1/chats/summaries");

    Ok(Json(resp))
}

/// GET /api/v1/chats/summaries
pub async fn list_summaries(
    State(state): State<AppState>,
    Caller(claims): Caller,
) -> Result<Json<ApiResponse<Vec<ChatSummary>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let summaries = state.query_service.summaries_for(&claims).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(summaries, request_id, elapsed)
        .with_link("self", "/api/v1/chats/summaries");

    Ok(Json(resp))
}

/// GET /api/v1/chats/{id}/messages
pub async fn get_messages(
    State(state): State<AppState>,
    Caller(claims): Caller,
    Path(chat_id): Path<String>,
    Query(query): Query<MessageListQuery>,
) -> Result<Json<ApiResponse<Vec<ChatMessage>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let id = parse_uuid(&chat_id)?;
    if query.limit.is_some_and(|l| l < 0) || query.offset.is_some_and(|o| o < 0) {
        return Err(AppError::Validation(
            "limit and offset must not be negative".to_string(),
        ));
    }

    let messages = state
        .query_service
        .messages_for(&claims, &id, query.limit, query.offset)
        .await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(messages, request_id, elapsed)
        .with_link("self", &format!("/api/v1/chats/{id}/messages"));

    Ok(Json(resp))
}
