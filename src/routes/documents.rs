use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::DocumentResponse;
use crate::storage::StorageError;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/list", get(list))
        .route("/upload", post(upload))
        .route("/{id}", delete(remove))
        .route("/{id}/download", get(download))
        .route("/{id}/text", get(text))
}

/// One file pulled out of a multipart body and parked in the request's
/// scratch directory.
pub(crate) struct UploadedFile {
    pub path: PathBuf,
    pub filename: String,
    pub mime_type: String,
}

/// Drain every file field from a multipart body into `scratch`. The scratch
/// name is index-prefixed so repeated client filenames cannot collide.
pub(crate) async fn collect_uploads(
    multipart: &mut Multipart,
    scratch: &std::path::Path,
) -> Result<Vec<UploadedFile>, AppError> {
    let mut uploads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let Some(raw_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let filename = sanitize_filename(&raw_name);

        let mime_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| {
                mime_guess::from_path(&filename)
                    .first_or_octet_stream()
                    .to_string()
            });

        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;

        let path = scratch.join(format!("{}_{}", uploads.len(), filename));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(StorageError::Io)?;

        uploads.push(UploadedFile {
            path,
            filename,
            mime_type,
        });
    }

    Ok(uploads)
}

/// Reduce a client-supplied filename to its last path component. Splits on
/// both separators: Windows browsers send `C:\fakepath\doc.pdf`, and on
/// Linux `Path::file_name` would pass that through whole, backslashes and
/// all.
fn sanitize_filename(raw: &str) -> String {
    raw.rsplit(['/', '\\'])
        .find(|part| !part.is_empty() && *part != "." && *part != "..")
        .unwrap_or("upload.bin")
        .to_string()
}

#[utoipa::path(
    post,
    path = "/api/documents/upload",
    tag = "documents",
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Document stored", body = DocumentResponse),
        (status = 400, description = "No file in the request"),
        (status = 409, description = "Byte-identical content already uploaded; the X-Existing-Document-Id header carries the existing id"),
    )
)]
pub async fn upload(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<DocumentResponse>), AppError> {
    let scratch = tempfile::tempdir().map_err(StorageError::Io)?;
    let uploads = collect_uploads(&mut multipart, scratch.path()).await?;
    let file = uploads
        .into_iter()
        .next()
        .ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;

    let document = super::reconciler(&state)
        .ingest_upload(&auth.user, &file.path, &file.filename, &file.mime_type)
        .await?;

    Ok((StatusCode::CREATED, Json(document.into())))
}

#[utoipa::path(
    get,
    path = "/api/documents/list",
    tag = "documents",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Documents owned by the caller", body = [DocumentResponse]))
)]
pub async fn list(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<DocumentResponse>>, AppError> {
    let documents = state
        .db
        .list_documents(auth.user.id, &auth.user.email)
        .await?;
    Ok(Json(documents.into_iter().map(Into::into).collect()))
}

#[utoipa::path(
    get,
    path = "/api/documents/{id}/download",
    tag = "documents",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document bytes"),
        (status = 404, description = "Unknown document, or its backing file is gone"),
    )
)]
pub async fn download(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let (document, file) = super::reconciler(&state).resolve_file(&auth.user, id).await?;

    let bytes = tokio::fs::read(file.path()).await.map_err(StorageError::Io)?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        document.original_filename.replace('"', "")
    );

    Ok((
        [
            (header::CONTENT_TYPE, document.mime_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

#[utoipa::path(
    delete,
    path = "/api/documents/{id}",
    tag = "documents",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 204, description = "Document and backing file removed"),
        (status = 404, description = "Unknown document"),
    )
)]
pub async fn remove(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    super::reconciler(&state)
        .delete_document(&auth.user, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/documents/{id}/text",
    tag = "documents",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Extracted text layer; empty for scanned documents"),
        (status = 404, description = "Unknown document"),
        (status = 422, description = "Text extraction failed"),
    )
)]
pub async fn text(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    let (document, file) = super::reconciler(&state).resolve_file(&auth.user, id).await?;

    let scratch = tempfile::tempdir().map_err(StorageError::Io)?;
    let extracted = super::converter(&state)
        .extract_text(file.path(), scratch.path())
        .await?;

    Ok(Json(serde_json::json!({
        "document_id": document.id,
        "text": extracted,
    })))
}
