use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// One question/answer exchange about a document. Append-only; rows are
/// removed only when their document goes away.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatHistory {
    pub id: Uuid,
    pub document_id: Uuid,
    pub user_id: Uuid,
    pub query: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AppendChatEntry {
    pub query: String,
    pub response: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ChatHistoryResponse {
    pub id: Uuid,
    pub document_id: Uuid,
    pub query: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

impl From<ChatHistory> for ChatHistoryResponse {
    fn from(entry: ChatHistory) -> Self {
        ChatHistoryResponse {
            id: entry.id,
            document_id: entry.document_id,
            query: entry.query,
            response: entry.response,
            created_at: entry.created_at,
        }
    }
}
