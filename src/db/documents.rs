use anyhow::Result;
use sqlx::Row;
use uuid::Uuid;

use super::Database;
use crate::models::{Document, NewDocument};

const DOCUMENT_COLUMNS: &str = "id, owner_id, owner_email, filename, original_filename, \
     file_path, file_size, mime_type, file_type, conversion_type, file_hash, \
     created_at, last_accessed";

fn document_from_row(row: &sqlx::postgres::PgRow) -> Document {
    Document {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        owner_email: row.get("owner_email"),
        filename: row.get("filename"),
        original_filename: row.get("original_filename"),
        file_path: row.get("file_path"),
        file_size: row.get("file_size"),
        mime_type: row.get("mime_type"),
        file_type: row.get("file_type"),
        conversion_type: row.get("conversion_type"),
        file_hash: row.get("file_hash"),
        created_at: row.get("created_at"),
        last_accessed: row.get("last_accessed"),
    }
}

impl Database {
    pub async fn create_document(&self, doc: NewDocument) -> Result<Document> {
        let row = sqlx::query(&format!(
            r#"INSERT INTO documents
               (id, owner_id, owner_email, filename, original_filename, file_path,
                file_size, mime_type, file_type, conversion_type, file_hash)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
               RETURNING {DOCUMENT_COLUMNS}"#
        ))
        .bind(doc.id)
        .bind(doc.owner_id)
        .bind(&doc.owner_email)
        .bind(&doc.filename)
        .bind(&doc.original_filename)
        .bind(&doc.file_path)
        .bind(doc.file_size)
        .bind(&doc.mime_type)
        .bind(&doc.file_type)
        .bind(&doc.conversion_type)
        .bind(&doc.file_hash)
        .fetch_one(&self.pool)
        .await?;

        Ok(document_from_row(&row))
    }

    /// Fetch a document only if one of the two ownership predicates matches:
    /// the durable owner id, or the denormalized owner email.
    pub async fn get_owned_document(
        &self,
        document_id: Uuid,
        owner_id: Uuid,
        owner_email: &str,
    ) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            r#"SELECT {DOCUMENT_COLUMNS} FROM documents
               WHERE id = $1 AND (owner_id = $2 OR owner_email = $3)"#
        ))
        .bind(document_id)
        .bind(owner_id)
        .bind(owner_email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(document_from_row))
    }

    /// Dedup lookup: the key is (owner, content hash), never the hash alone.
    pub async fn get_document_by_owner_and_hash(
        &self,
        owner_id: Uuid,
        file_hash: &str,
    ) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            r#"SELECT {DOCUMENT_COLUMNS} FROM documents
               WHERE owner_id = $1 AND file_hash = $2"#
        ))
        .bind(owner_id)
        .bind(file_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(document_from_row))
    }

    pub async fn list_documents(&self, owner_id: Uuid, owner_email: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            r#"SELECT {DOCUMENT_COLUMNS} FROM documents
               WHERE owner_id = $1 OR owner_email = $2
               ORDER BY created_at DESC"#
        ))
        .bind(owner_id)
        .bind(owner_email)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(document_from_row).collect())
    }

    pub async fn touch_last_accessed(&self, document_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE documents SET last_accessed = NOW() WHERE id = $1")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Returns whether a row was actually deleted.
    pub async fn delete_document(&self, document_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
