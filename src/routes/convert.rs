//! Conversion endpoints. Every handler follows the same shape: resolve the
//! source document(s), run one tool pipeline in a scratch directory, persist
//! the output as a derived document, and return its record.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::convert::ops::{TextEdit, TextPlacement};
use crate::error::AppError;
use crate::ingestion::DerivedSpec;
use crate::models::{Document, DocumentResponse};
use crate::storage::StorageError;
use crate::AppState;
use crate::auth::AuthUser;

use super::documents::collect_uploads;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/merge", post(merge))
        .route("/image-to-pdf", post(image_to_pdf))
        .route("/convert/office-to-pdf", post(office_to_pdf))
        .route("/{id}/watermark", post(watermark))
        .route("/{id}/compress", post(compress))
        .route("/{id}/to-jpg", post(to_jpg))
        .route("/{id}/to-epub", post(to_epub))
        .route("/{id}/to-docx", post(to_docx))
        .route("/{id}/edit-text", post(edit_text))
        .route("/{id}/add-text", post(add_text))
        .route("/{id}/remove-images", post(remove_images))
        .route("/{id}/annotate", post(annotate))
        .route("/{id}/reorder-pages", post(reorder_pages))
        .route("/{id}/rotate", post(rotate))
        .route("/{id}/split", post(split))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MergeRequest {
    pub document_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WatermarkRequest {
    pub text: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddTextRequest {
    pub text: String,
    pub x: f64,
    pub y: f64,
    #[serde(default = "default_font_size")]
    pub font_size: f64,
    /// 1-based page; omitted means every page.
    pub page: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EditTextRequest {
    pub new_text: String,
    pub page: u32,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default = "default_font_size")]
    pub font_size: f64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReorderRequest {
    /// 1-based source page numbers in their new order.
    pub page_order: Vec<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SplitRequest {
    /// 1-based first page of the extracted range.
    pub start_page: u32,
    /// 1-based last page, inclusive.
    pub end_page: u32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RotateRequest {
    /// Multiple of 90; negative rotates counter-clockwise.
    pub degrees: i32,
    /// 1-based pages to rotate; omitted rotates all.
    pub pages: Option<Vec<u32>>,
}

fn default_font_size() -> f64 {
    12.0
}

fn ensure_pdf(document: &Document) -> Result<(), AppError> {
    if document.file_type != "pdf" && document.mime_type != "application/pdf" {
        return Err(AppError::BadRequest(format!(
            "Operation requires a PDF document, got {}",
            document.file_type
        )));
    }
    Ok(())
}

fn stem(filename: &str) -> &str {
    std::path::Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document")
}

fn scratch_dir() -> Result<tempfile::TempDir, AppError> {
    tempfile::tempdir()
        .map_err(StorageError::Io)
        .map_err(Into::into)
}

type Created = (StatusCode, Json<DocumentResponse>);

#[utoipa::path(
    post,
    path = "/api/documents/merge",
    tag = "convert",
    security(("bearer_auth" = [])),
    request_body = MergeRequest,
    responses(
        (status = 201, description = "Merged document", body = DocumentResponse),
        (status = 400, description = "Fewer than two documents, or a non-PDF source"),
        (status = 404, description = "A source document is unknown or its file is gone"),
        (status = 422, description = "Merge failed"),
    )
)]
pub async fn merge(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(payload): Json<MergeRequest>,
) -> Result<Created, AppError> {
    if payload.document_ids.len() < 2 {
        return Err(AppError::BadRequest(
            "Merging requires at least two documents".to_string(),
        ));
    }

    let reconciler = super::reconciler(&state);
    let mut sources = Vec::with_capacity(payload.document_ids.len());
    // retrieved files own their scratch downloads; keep them alive past merge
    let mut retained = Vec::with_capacity(payload.document_ids.len());
    let mut inputs = Vec::with_capacity(payload.document_ids.len());

    for id in &payload.document_ids {
        let (document, file) = reconciler.resolve_file(&auth.user, *id).await?;
        ensure_pdf(&document)?;
        inputs.push(file.path().to_path_buf());
        retained.push(file);
        sources.push(document);
    }

    let scratch = scratch_dir()?;
    let output = super::converter(&state)
        .merge_pdfs(&inputs, scratch.path())
        .await?;

    let derived = reconciler
        .create_derived(
            &sources[0],
            &output,
            DerivedSpec {
                filename: "merged.pdf".to_string(),
                conversion_type: "merge",
                mime_type: None,
                file_type: None,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(derived.into())))
}

#[utoipa::path(
    post,
    path = "/api/documents/{id}/watermark",
    tag = "convert",
    security(("bearer_auth" = [])),
    request_body = WatermarkRequest,
    params(("id" = Uuid, Path, description = "Source document id")),
    responses(
        (status = 201, description = "Watermarked document", body = DocumentResponse),
        (status = 404, description = "Unknown document"),
        (status = 422, description = "Watermarking failed"),
    )
)]
pub async fn watermark(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<WatermarkRequest>,
) -> Result<Created, AppError> {
    if payload.text.trim().is_empty() {
        return Err(AppError::BadRequest(
            "Watermark text must not be empty".to_string(),
        ));
    }

    let reconciler = super::reconciler(&state);
    let (document, file) = reconciler.resolve_file(&auth.user, id).await?;
    ensure_pdf(&document)?;

    let scratch = scratch_dir()?;
    let output = super::converter(&state)
        .watermark_pdf(file.path(), payload.text.trim(), scratch.path())
        .await?;

    let derived = reconciler
        .create_derived(
            &document,
            &output,
            DerivedSpec {
                filename: format!("watermarked_{}", document.original_filename),
                conversion_type: "watermark",
                mime_type: None,
                file_type: None,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(derived.into())))
}

#[utoipa::path(
    post,
    path = "/api/documents/{id}/compress",
    tag = "convert",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Source document id")),
    responses(
        (status = 201, description = "Compressed document", body = DocumentResponse),
        (status = 404, description = "Unknown document"),
        (status = 422, description = "Compression failed"),
    )
)]
pub async fn compress(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Created, AppError> {
    let reconciler = super::reconciler(&state);
    let (document, file) = reconciler.resolve_file(&auth.user, id).await?;
    ensure_pdf(&document)?;

    let scratch = scratch_dir()?;
    let output = super::converter(&state)
        .compress_pdf(file.path(), scratch.path())
        .await?;

    let derived = reconciler
        .create_derived(
            &document,
            &output,
            DerivedSpec {
                filename: format!("compressed_{}", document.original_filename),
                conversion_type: "compress",
                mime_type: None,
                file_type: None,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(derived.into())))
}

#[utoipa::path(
    post,
    path = "/api/documents/{id}/to-jpg",
    tag = "convert",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Source document id")),
    responses(
        (status = 201, description = "Zip of page JPEGs", body = DocumentResponse),
        (status = 404, description = "Unknown document"),
        (status = 422, description = "Rendering failed"),
    )
)]
pub async fn to_jpg(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Created, AppError> {
    let reconciler = super::reconciler(&state);
    let (document, file) = reconciler.resolve_file(&auth.user, id).await?;
    ensure_pdf(&document)?;

    let scratch = scratch_dir()?;
    let output = super::converter(&state)
        .pdf_to_jpg_zip(file.path(), scratch.path())
        .await?;

    let derived = reconciler
        .create_derived(
            &document,
            &output,
            DerivedSpec {
                filename: format!("{}_pages.zip", stem(&document.original_filename)),
                conversion_type: "pdf_to_jpg",
                mime_type: Some("application/zip".to_string()),
                file_type: Some("zip".to_string()),
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(derived.into())))
}

#[utoipa::path(
    post,
    path = "/api/documents/{id}/to-epub",
    tag = "convert",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Source document id")),
    responses(
        (status = 201, description = "EPUB document", body = DocumentResponse),
        (status = 404, description = "Unknown document"),
        (status = 422, description = "Conversion failed"),
    )
)]
pub async fn to_epub(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Created, AppError> {
    let reconciler = super::reconciler(&state);
    let (document, file) = reconciler.resolve_file(&auth.user, id).await?;
    ensure_pdf(&document)?;

    let scratch = scratch_dir()?;
    let output = super::converter(&state)
        .pdf_to_epub(file.path(), scratch.path())
        .await?;

    let derived = reconciler
        .create_derived(
            &document,
            &output,
            DerivedSpec {
                filename: format!("{}.epub", stem(&document.original_filename)),
                conversion_type: "pdf_to_epub",
                mime_type: Some("application/epub+zip".to_string()),
                file_type: Some("epub".to_string()),
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(derived.into())))
}

#[utoipa::path(
    post,
    path = "/api/documents/{id}/to-docx",
    tag = "convert",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Source document id")),
    responses(
        (status = 201, description = "DOCX document", body = DocumentResponse),
        (status = 404, description = "Unknown document"),
        (status = 422, description = "Conversion failed"),
    )
)]
pub async fn to_docx(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Created, AppError> {
    let reconciler = super::reconciler(&state);
    let (document, file) = reconciler.resolve_file(&auth.user, id).await?;
    ensure_pdf(&document)?;

    let scratch = scratch_dir()?;
    let output = super::converter(&state)
        .pdf_to_docx(file.path(), scratch.path())
        .await?;

    let derived = reconciler
        .create_derived(
            &document,
            &output,
            DerivedSpec {
                filename: format!("{}.docx", stem(&document.original_filename)),
                conversion_type: "pdf_to_docx",
                mime_type: Some(
                    "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                        .to_string(),
                ),
                file_type: Some("docx".to_string()),
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(derived.into())))
}

#[utoipa::path(
    post,
    path = "/api/documents/image-to-pdf",
    tag = "convert",
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "PDF assembled from the uploaded images", body = DocumentResponse),
        (status = 400, description = "No images in the request"),
        (status = 422, description = "Assembly failed"),
    )
)]
pub async fn image_to_pdf(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Result<Created, AppError> {
    let scratch = scratch_dir()?;
    let uploads = collect_uploads(&mut multipart, scratch.path()).await?;
    if uploads.is_empty() {
        return Err(AppError::BadRequest("No images provided".to_string()));
    }

    let inputs: Vec<_> = uploads.iter().map(|u| u.path.clone()).collect();
    let output = super::converter(&state)
        .images_to_pdf(&inputs, scratch.path())
        .await?;

    let filename = format!("{}.pdf", stem(&uploads[0].filename));
    let document = super::reconciler(&state)
        .ingest_generated(
            &auth.user,
            &output,
            &filename,
            "application/pdf",
            "image_to_pdf",
        )
        .await?;

    Ok((StatusCode::CREATED, Json(document.into())))
}

#[utoipa::path(
    post,
    path = "/api/documents/convert/office-to-pdf",
    tag = "convert",
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "PDF rendering of the uploaded office document", body = DocumentResponse),
        (status = 400, description = "No file in the request"),
        (status = 422, description = "Conversion failed"),
    )
)]
pub async fn office_to_pdf(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Result<Created, AppError> {
    let scratch = scratch_dir()?;
    let uploads = collect_uploads(&mut multipart, scratch.path()).await?;
    let file = uploads
        .into_iter()
        .next()
        .ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;

    let output = super::converter(&state)
        .office_to_pdf(&file.path, scratch.path())
        .await?;

    let filename = format!("{}.pdf", stem(&file.filename));
    let document = super::reconciler(&state)
        .ingest_generated(
            &auth.user,
            &output,
            &filename,
            "application/pdf",
            "office_to_pdf",
        )
        .await?;

    Ok((StatusCode::CREATED, Json(document.into())))
}

#[utoipa::path(
    post,
    path = "/api/documents/{id}/edit-text",
    tag = "convert",
    security(("bearer_auth" = [])),
    request_body = EditTextRequest,
    params(("id" = Uuid, Path, description = "Source document id")),
    responses(
        (status = 201, description = "Document with the region replaced", body = DocumentResponse),
        (status = 404, description = "Unknown document"),
        (status = 422, description = "Edit failed"),
    )
)]
pub async fn edit_text(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<EditTextRequest>,
) -> Result<Created, AppError> {
    if payload.page == 0 {
        return Err(AppError::BadRequest("Pages are 1-based".to_string()));
    }

    let reconciler = super::reconciler(&state);
    let (document, file) = reconciler.resolve_file(&auth.user, id).await?;
    ensure_pdf(&document)?;

    let edit = TextEdit {
        new_text: payload.new_text,
        x: payload.x,
        y: payload.y,
        width: payload.width,
        height: payload.height,
        font_size: payload.font_size,
        page: payload.page,
    };

    let scratch = scratch_dir()?;
    let output = super::converter(&state)
        .edit_text(file.path(), &edit, scratch.path())
        .await?;

    let derived = reconciler
        .create_derived(
            &document,
            &output,
            DerivedSpec {
                filename: format!("edited_{}", document.original_filename),
                conversion_type: "edit_text",
                mime_type: None,
                file_type: None,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(derived.into())))
}

#[utoipa::path(
    post,
    path = "/api/documents/{id}/add-text",
    tag = "convert",
    security(("bearer_auth" = [])),
    request_body = AddTextRequest,
    params(("id" = Uuid, Path, description = "Source document id")),
    responses(
        (status = 201, description = "Document with text stamped on", body = DocumentResponse),
        (status = 404, description = "Unknown document"),
        (status = 422, description = "Stamping failed"),
    )
)]
pub async fn add_text(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddTextRequest>,
) -> Result<Created, AppError> {
    let reconciler = super::reconciler(&state);
    let (document, file) = reconciler.resolve_file(&auth.user, id).await?;
    ensure_pdf(&document)?;

    let placement = TextPlacement {
        text: payload.text,
        x: payload.x,
        y: payload.y,
        font_size: payload.font_size,
        page: payload.page,
    };

    let scratch = scratch_dir()?;
    let output = super::converter(&state)
        .add_text(file.path(), &placement, scratch.path())
        .await?;

    let derived = reconciler
        .create_derived(
            &document,
            &output,
            DerivedSpec {
                filename: format!("stamped_{}", document.original_filename),
                conversion_type: "add_text",
                mime_type: None,
                file_type: None,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(derived.into())))
}

#[utoipa::path(
    post,
    path = "/api/documents/{id}/remove-images",
    tag = "convert",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Source document id")),
    responses(
        (status = 201, description = "Document with images filtered out", body = DocumentResponse),
        (status = 404, description = "Unknown document"),
        (status = 422, description = "Filtering failed"),
    )
)]
pub async fn remove_images(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Created, AppError> {
    let reconciler = super::reconciler(&state);
    let (document, file) = reconciler.resolve_file(&auth.user, id).await?;
    ensure_pdf(&document)?;

    let scratch = scratch_dir()?;
    let output = super::converter(&state)
        .remove_images(file.path(), scratch.path())
        .await?;

    let derived = reconciler
        .create_derived(
            &document,
            &output,
            DerivedSpec {
                filename: format!("no_images_{}", document.original_filename),
                conversion_type: "remove_images",
                mime_type: None,
                file_type: None,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(derived.into())))
}

#[utoipa::path(
    post,
    path = "/api/documents/{id}/annotate",
    tag = "convert",
    security(("bearer_auth" = [])),
    request_body = AddTextRequest,
    params(("id" = Uuid, Path, description = "Source document id")),
    responses(
        (status = 201, description = "Annotated document", body = DocumentResponse),
        (status = 404, description = "Unknown document"),
        (status = 422, description = "Annotation failed"),
    )
)]
pub async fn annotate(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddTextRequest>,
) -> Result<Created, AppError> {
    let reconciler = super::reconciler(&state);
    let (document, file) = reconciler.resolve_file(&auth.user, id).await?;
    ensure_pdf(&document)?;

    let placement = TextPlacement {
        text: payload.text,
        x: payload.x,
        y: payload.y,
        font_size: payload.font_size,
        page: payload.page,
    };

    let scratch = scratch_dir()?;
    let output = super::converter(&state)
        .annotate(file.path(), &placement, scratch.path())
        .await?;

    let derived = reconciler
        .create_derived(
            &document,
            &output,
            DerivedSpec {
                filename: format!("annotated_{}", document.original_filename),
                conversion_type: "annotate",
                mime_type: None,
                file_type: None,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(derived.into())))
}

#[utoipa::path(
    post,
    path = "/api/documents/{id}/reorder-pages",
    tag = "convert",
    security(("bearer_auth" = [])),
    request_body = ReorderRequest,
    params(("id" = Uuid, Path, description = "Source document id")),
    responses(
        (status = 201, description = "Document with pages reordered", body = DocumentResponse),
        (status = 404, description = "Unknown document"),
        (status = 422, description = "Reordering failed"),
    )
)]
pub async fn reorder_pages(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReorderRequest>,
) -> Result<Created, AppError> {
    let reconciler = super::reconciler(&state);
    let (document, file) = reconciler.resolve_file(&auth.user, id).await?;
    ensure_pdf(&document)?;

    let scratch = scratch_dir()?;
    let output = super::converter(&state)
        .reorder_pages(file.path(), &payload.page_order, scratch.path())
        .await?;

    let derived = reconciler
        .create_derived(
            &document,
            &output,
            DerivedSpec {
                filename: format!("reordered_{}", document.original_filename),
                conversion_type: "reorder_pages",
                mime_type: None,
                file_type: None,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(derived.into())))
}

#[utoipa::path(
    post,
    path = "/api/documents/{id}/rotate",
    tag = "convert",
    security(("bearer_auth" = [])),
    request_body = RotateRequest,
    params(("id" = Uuid, Path, description = "Source document id")),
    responses(
        (status = 201, description = "Rotated document", body = DocumentResponse),
        (status = 404, description = "Unknown document"),
        (status = 422, description = "Rotation failed"),
    )
)]
pub async fn rotate(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RotateRequest>,
) -> Result<Created, AppError> {
    let reconciler = super::reconciler(&state);
    let (document, file) = reconciler.resolve_file(&auth.user, id).await?;
    ensure_pdf(&document)?;

    let scratch = scratch_dir()?;
    let output = super::converter(&state)
        .rotate_pages(
            file.path(),
            payload.degrees,
            payload.pages.as_deref(),
            scratch.path(),
        )
        .await?;

    let derived = reconciler
        .create_derived(
            &document,
            &output,
            DerivedSpec {
                filename: format!("rotated_{}", document.original_filename),
                conversion_type: "rotate",
                mime_type: None,
                file_type: None,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(derived.into())))
}

#[utoipa::path(
    post,
    path = "/api/documents/{id}/split",
    tag = "convert",
    security(("bearer_auth" = [])),
    request_body = SplitRequest,
    params(("id" = Uuid, Path, description = "Source document id")),
    responses(
        (status = 201, description = "Document containing only the requested pages", body = DocumentResponse),
        (status = 404, description = "Unknown document"),
        (status = 422, description = "Split failed or range invalid"),
    )
)]
pub async fn split(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SplitRequest>,
) -> Result<Created, AppError> {
    let reconciler = super::reconciler(&state);
    let (document, file) = reconciler.resolve_file(&auth.user, id).await?;
    ensure_pdf(&document)?;

    let scratch = scratch_dir()?;
    let output = super::converter(&state)
        .split_pdf(file.path(), payload.start_page, payload.end_page, scratch.path())
        .await?;

    let derived = reconciler
        .create_derived(
            &document,
            &output,
            DerivedSpec {
                filename: format!(
                    "{}_p{}-{}.pdf",
                    stem(&document.original_filename),
                    payload.start_page,
                    payload.end_page
                ),
                conversion_type: "split",
                mime_type: None,
                file_type: None,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(derived.into())))
}
