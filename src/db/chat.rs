use anyhow::Result;
use sqlx::Row;
use uuid::Uuid;

use super::Database;
use crate::models::ChatHistory;

fn chat_from_row(row: &sqlx::postgres::PgRow) -> ChatHistory {
    ChatHistory {
        id: row.get("id"),
        document_id: row.get("document_id"),
        user_id: row.get("user_id"),
        query: row.get("query"),
        response: row.get("response"),
        created_at: row.get("created_at"),
    }
}

impl Database {
    pub async fn append_chat_entry(
        &self,
        document_id: Uuid,
        user_id: Uuid,
        query: &str,
        response: &str,
    ) -> Result<ChatHistory> {
        let row = sqlx::query(
            r#"INSERT INTO chat_history (document_id, user_id, query, response)
               VALUES ($1, $2, $3, $4)
               RETURNING id, document_id, user_id, query, response, created_at"#,
        )
        .bind(document_id)
        .bind(user_id)
        .bind(query)
        .bind(response)
        .fetch_one(&self.pool)
        .await?;

        Ok(chat_from_row(&row))
    }

    pub async fn list_chat_history(&self, document_id: Uuid) -> Result<Vec<ChatHistory>> {
        let rows = sqlx::query(
            r#"SELECT id, document_id, user_id, query, response, created_at
               FROM chat_history WHERE document_id = $1
               ORDER BY created_at ASC"#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(chat_from_row).collect())
    }
}
