use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// One stored artifact: an uploaded original or a conversion output.
///
/// Ownership is recorded twice: `owner_id` is the durable key set at
/// creation, `owner_email` is a denormalized copy of the owner's email kept
/// as a lookup fallback. `file_hash` is present exactly when the document was
/// uploaded directly; conversion outputs carry `conversion_type` instead and
/// sit outside future dedup checks.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub owner_email: Option<String>,
    pub filename: String,
    pub original_filename: String,
    /// Backend-relative storage path, `documents/<id>/<name>`.
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub file_type: String,
    pub conversion_type: Option<String>,
    pub file_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub filename: String,
    pub original_filename: String,
    pub file_size: i64,
    pub mime_type: String,
    pub file_type: String,
    pub conversion_type: Option<String>,
    pub file_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        DocumentResponse {
            id: doc.id,
            filename: doc.filename,
            original_filename: doc.original_filename,
            file_size: doc.file_size,
            mime_type: doc.mime_type,
            file_type: doc.file_type,
            conversion_type: doc.conversion_type,
            file_hash: doc.file_hash,
            created_at: doc.created_at,
            last_accessed: doc.last_accessed,
        }
    }
}

/// Fields the reconciler needs to insert a new document row.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub owner_email: Option<String>,
    pub filename: String,
    pub original_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub file_type: String,
    pub conversion_type: Option<String>,
    pub file_hash: Option<String>,
}

/// File-type tag derived from a filename extension (`pdf`, `docx`, `jpg`, ...).
pub fn file_type_tag(filename: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .unwrap_or_else(|| "bin".to_string())
}

#[cfg(test)]
mod tests {
    use super::file_type_tag;

    #[test]
    fn file_type_tag_lowercases_extension() {
        assert_eq!(file_type_tag("Report.PDF"), "pdf");
        assert_eq!(file_type_tag("scan.jpeg"), "jpeg");
    }

    #[test]
    fn file_type_tag_defaults_without_extension() {
        assert_eq!(file_type_tag("README"), "bin");
    }
}
