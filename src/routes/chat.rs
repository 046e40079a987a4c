//! Per-document chat transcript storage. The service records exchanges
//! produced elsewhere; it does not generate answers itself.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::{AppendChatEntry, ChatHistoryResponse};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/{id}/chat-history", get(list_history).post(append_entry))
}

#[utoipa::path(
    get,
    path = "/api/documents/{id}/chat-history",
    tag = "chat",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Transcript in chronological order", body = [ChatHistoryResponse]),
        (status = 404, description = "Unknown document"),
    )
)]
pub async fn list_history(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ChatHistoryResponse>>, AppError> {
    // ownership check; the transcript itself is keyed by document
    let document = super::reconciler(&state)
        .resolve_document(&auth.user, id)
        .await?;

    let entries = state.db.list_chat_history(document.id).await?;
    Ok(Json(entries.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    post,
    path = "/api/documents/{id}/chat-history",
    tag = "chat",
    security(("bearer_auth" = [])),
    request_body = AppendChatEntry,
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 201, description = "Entry appended", body = ChatHistoryResponse),
        (status = 404, description = "Unknown document"),
    )
)]
pub async fn append_entry(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AppendChatEntry>,
) -> Result<(StatusCode, Json<ChatHistoryResponse>), AppError> {
    let document = super::reconciler(&state)
        .resolve_document(&auth.user, id)
        .await?;

    let entry = state
        .db
        .append_chat_entry(document.id, auth.user.id, &payload.query, &payload.response)
        .await?;

    Ok((StatusCode::CREATED, Json(entry.into())))
}
