use axum::{
    http::{header::HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use crate::convert::ConversionError;
use crate::storage::StorageError;

/// Header carrying the pre-existing document id on a duplicate upload.
pub static EXISTING_DOCUMENT_HEADER: HeaderName =
    HeaderName::from_static("x-existing-document-id");

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Document not found")]
    DocumentNotFound,

    /// The record existed but its backing object is gone; the stale record
    /// has already been deleted by the reconciler.
    #[error("File no longer available, please re-upload")]
    FileGone { document_id: Uuid },

    /// Not a failure: the same user already uploaded byte-identical content.
    #[error("Content already uploaded as document {existing_id}")]
    DuplicateContent { existing_id: Uuid },

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::DocumentNotFound => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "error": "Document not found" })),
            )
                .into_response(),
            AppError::FileGone { document_id } => {
                tracing::warn!("Serving re-upload notice for orphaned document {}", document_id);
                (
                    StatusCode::NOT_FOUND,
                    Json(serde_json::json!({
                        "error": "File no longer available, please re-upload",
                        "document_id": document_id,
                    })),
                )
                    .into_response()
            }
            AppError::DuplicateContent { existing_id } => (
                StatusCode::CONFLICT,
                [(EXISTING_DOCUMENT_HEADER.clone(), existing_id.to_string())],
                Json(serde_json::json!({
                    "error": "Content already uploaded",
                    "existing_document_id": existing_id,
                })),
            )
                .into_response(),
            AppError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": message })),
            )
                .into_response(),
            AppError::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": message })),
            )
                .into_response(),
            AppError::Storage(StorageError::NotFound { path }) => {
                tracing::warn!("Storage object missing: {}", path);
                (
                    StatusCode::NOT_FOUND,
                    Json(serde_json::json!({
                        "error": "File no longer available, please re-upload",
                    })),
                )
                    .into_response()
            }
            AppError::Storage(err) => {
                // MalformedPath and backend failures are integrity bugs, not
                // user-recoverable conditions
                tracing::error!("Storage error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "Internal storage error" })),
                )
                    .into_response()
            }
            AppError::Conversion(err) => {
                tracing::error!("Conversion failed: {}", err);
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(serde_json::json!({ "error": format!("Conversion failed: {}", err) })),
                )
                    .into_response()
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
            AppError::Internal(err) => {
                tracing::error!("Internal error: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_content_maps_to_conflict_with_header() {
        let existing_id = Uuid::new_v4();
        let response = AppError::DuplicateContent { existing_id }.into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let header = response
            .headers()
            .get(&EXISTING_DOCUMENT_HEADER)
            .expect("conflict response carries the existing document id");
        assert_eq!(header.to_str().unwrap(), existing_id.to_string());
    }

    #[test]
    fn file_gone_maps_to_not_found() {
        let response = AppError::FileGone {
            document_id: Uuid::new_v4(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn malformed_path_is_an_internal_error() {
        let response = AppError::Storage(StorageError::MalformedPath {
            path: "not/a/valid/storage/path".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
