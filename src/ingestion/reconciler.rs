//! Document record reconciliation.
//!
//! The reconciler owns every policy decision around document identity:
//! which of the two ownership predicates admits a request, when an upload is
//! a per-user duplicate, when a record whose backing object vanished gets
//! self-healed, and how conversion outputs become new records.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::hash::hash_file;
use crate::db::Database;
use crate::error::AppError;
use crate::models::{file_type_tag, Document, NewDocument, User};
use crate::storage::{RetrievedFile, StorageBackend, StorageError};

/// The document persistence operations the reconciler depends on.
/// [`Database`] is the production implementation; tests substitute an
/// in-memory store so the dedup and self-healing branches run without
/// Postgres.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_document(&self, doc: NewDocument) -> Result<Document>;
    async fn get_owned_document(
        &self,
        document_id: Uuid,
        owner_id: Uuid,
        owner_email: &str,
    ) -> Result<Option<Document>>;
    async fn get_document_by_owner_and_hash(
        &self,
        owner_id: Uuid,
        file_hash: &str,
    ) -> Result<Option<Document>>;
    async fn touch_last_accessed(&self, document_id: Uuid) -> Result<()>;
    async fn delete_document(&self, document_id: Uuid) -> Result<bool>;
}

#[async_trait]
impl DocumentStore for Database {
    async fn create_document(&self, doc: NewDocument) -> Result<Document> {
        Database::create_document(self, doc).await
    }

    async fn get_owned_document(
        &self,
        document_id: Uuid,
        owner_id: Uuid,
        owner_email: &str,
    ) -> Result<Option<Document>> {
        Database::get_owned_document(self, document_id, owner_id, owner_email).await
    }

    async fn get_document_by_owner_and_hash(
        &self,
        owner_id: Uuid,
        file_hash: &str,
    ) -> Result<Option<Document>> {
        Database::get_document_by_owner_and_hash(self, owner_id, file_hash).await
    }

    async fn touch_last_accessed(&self, document_id: Uuid) -> Result<()> {
        Database::touch_last_accessed(self, document_id).await
    }

    async fn delete_document(&self, document_id: Uuid) -> Result<bool> {
        Database::delete_document(self, document_id).await
    }
}

/// How a conversion output turns into a document record. Edit-family
/// operations inherit the source's mime/file type; format conversions
/// override them.
#[derive(Debug, Clone)]
pub struct DerivedSpec {
    pub filename: String,
    pub conversion_type: &'static str,
    /// `None` inherits the source document's MIME type.
    pub mime_type: Option<String>,
    /// `None` inherits the source document's file-type tag.
    pub file_type: Option<String>,
}

#[derive(Clone)]
pub struct DocumentReconciler {
    db: Arc<dyn DocumentStore>,
    storage: Arc<dyn StorageBackend>,
}

impl DocumentReconciler {
    pub fn new(db: impl DocumentStore + 'static, storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            db: Arc::new(db),
            storage,
        }
    }

    /// Ingest an uploaded file sitting at `source`.
    ///
    /// The content hash is computed first and checked against the owner's
    /// existing documents; a match is a Conflict carrying the existing id,
    /// not a failure. The same Conflict is produced when a concurrent upload
    /// wins the insert race and trips the `(owner_id, file_hash)` unique
    /// index.
    pub async fn ingest_upload(
        &self,
        owner: &User,
        source: &Path,
        original_filename: &str,
        mime_type: &str,
    ) -> Result<Document, AppError> {
        let file_hash = hash_file(source).await.map_err(StorageError::Io)?;
        let file_size = tokio::fs::metadata(source)
            .await
            .map_err(StorageError::Io)?
            .len() as i64;

        debug!(
            "Ingesting {} for user {} (hash: {}, size: {} bytes)",
            original_filename,
            owner.id,
            &file_hash[..8],
            file_size
        );

        if let Some(existing) = self
            .db
            .get_document_by_owner_and_hash(owner.id, &file_hash)
            .await?
        {
            debug!(
                "Duplicate content for user {}: matches document {}",
                owner.id, existing.id
            );
            return Err(AppError::DuplicateContent {
                existing_id: existing.id,
            });
        }

        let document_id = Uuid::new_v4();
        let stored_path = self
            .storage
            .store(source, document_id, original_filename)
            .await?;

        let record = NewDocument {
            id: document_id,
            owner_id: owner.id,
            owner_email: Some(owner.email.clone()),
            filename: original_filename.to_string(),
            original_filename: original_filename.to_string(),
            file_path: stored_path.clone(),
            file_size,
            mime_type: mime_type.to_string(),
            file_type: file_type_tag(original_filename),
            conversion_type: None,
            file_hash: Some(file_hash.clone()),
        };

        match self.db.create_document(record).await {
            Ok(document) => {
                info!(
                    "Ingested document {} ({}) for user {}",
                    document.id, document.original_filename, owner.id
                );
                Ok(document)
            }
            Err(e) if is_hash_conflict(&e) => {
                // Lost the insert race: another request with the same bytes
                // committed first. Drop our object and point at the winner.
                warn!(
                    "Concurrent duplicate upload for user {} (hash: {})",
                    owner.id,
                    &file_hash[..8]
                );
                let _ = self.storage.remove(&stored_path).await;
                match self
                    .db
                    .get_document_by_owner_and_hash(owner.id, &file_hash)
                    .await?
                {
                    Some(existing) => Err(AppError::DuplicateContent {
                        existing_id: existing.id,
                    }),
                    None => Err(AppError::Internal(e)),
                }
            }
            Err(e) => {
                // No row means the stored object is unowned; remove it so a
                // failed insert leaves nothing behind
                let _ = self.storage.remove(&stored_path).await;
                Err(AppError::Internal(e))
            }
        }
    }

    /// Fetch a document if either ownership predicate admits the user, and
    /// bump its access timestamp.
    pub async fn resolve_document(
        &self,
        user: &User,
        document_id: Uuid,
    ) -> Result<Document, AppError> {
        let document = self
            .db
            .get_owned_document(document_id, user.id, &user.email)
            .await?
            .ok_or(AppError::DocumentNotFound)?;

        self.db.touch_last_accessed(document.id).await?;
        Ok(document)
    }

    /// Resolve a document and its backing file.
    ///
    /// Discovering a missing object deletes the record within this call —
    /// a row's existence is only a reliable signal of file existence after
    /// an access has succeeded.
    pub async fn resolve_file(
        &self,
        user: &User,
        document_id: Uuid,
    ) -> Result<(Document, RetrievedFile), AppError> {
        let document = self.resolve_document(user, document_id).await?;

        match self.storage.retrieve(&document.file_path).await {
            Ok(file) => Ok((document, file)),
            Err(StorageError::NotFound { path }) => {
                warn!(
                    "Backing object missing for document {} ({}); deleting stale record",
                    document.id, path
                );
                self.db.delete_document(document.id).await?;
                Err(AppError::FileGone {
                    document_id: document.id,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a document record and its backing object. "Already absent" on
    /// the object side is not an error.
    pub async fn delete_document(&self, user: &User, document_id: Uuid) -> Result<(), AppError> {
        let document = self.resolve_document(user, document_id).await?;

        let removed = self.storage.remove(&document.file_path).await?;
        if !removed {
            debug!("Object already absent for document {}", document.id);
        }
        self.db.delete_document(document.id).await?;
        info!("Deleted document {} for user {}", document.id, user.id);
        Ok(())
    }

    /// Persist a conversion output as a new document owned by the source's
    /// owner. Derived documents never inherit the source hash: the digest
    /// would be wrong for the new bytes, so they carry none and sit outside
    /// dedup.
    pub async fn create_derived(
        &self,
        source_doc: &Document,
        output: &Path,
        spec: DerivedSpec,
    ) -> Result<Document, AppError> {
        let file_size = tokio::fs::metadata(output)
            .await
            .map_err(StorageError::Io)?
            .len() as i64;

        let document_id = Uuid::new_v4();
        let stored_path = self
            .storage
            .store(output, document_id, &spec.filename)
            .await?;

        let record = derived_record(source_doc, document_id, stored_path.clone(), file_size, spec);

        match self.db.create_document(record).await {
            Ok(document) => {
                info!(
                    "Created derived document {} ({}) from {}",
                    document.id,
                    document.conversion_type.as_deref().unwrap_or("?"),
                    source_doc.id
                );
                Ok(document)
            }
            Err(e) => {
                let _ = self.storage.remove(&stored_path).await;
                Err(AppError::Internal(e))
            }
        }
    }

    /// Persist a generated file that has no source document, such as a PDF
    /// assembled from uploaded images. Same record shape as other derived
    /// documents: fresh id, no hash, conversion tag set.
    pub async fn ingest_generated(
        &self,
        owner: &User,
        output: &Path,
        filename: &str,
        mime_type: &str,
        conversion_type: &'static str,
    ) -> Result<Document, AppError> {
        let file_size = tokio::fs::metadata(output)
            .await
            .map_err(StorageError::Io)?
            .len() as i64;

        let document_id = Uuid::new_v4();
        let stored_path = self.storage.store(output, document_id, filename).await?;

        let record = NewDocument {
            id: document_id,
            owner_id: owner.id,
            owner_email: Some(owner.email.clone()),
            filename: filename.to_string(),
            original_filename: filename.to_string(),
            file_path: stored_path.clone(),
            file_size,
            mime_type: mime_type.to_string(),
            file_type: file_type_tag(filename),
            conversion_type: Some(conversion_type.to_string()),
            file_hash: None,
        };

        match self.db.create_document(record).await {
            Ok(document) => {
                info!(
                    "Created generated document {} ({}) for user {}",
                    document.id, conversion_type, owner.id
                );
                Ok(document)
            }
            Err(e) => {
                let _ = self.storage.remove(&stored_path).await;
                Err(AppError::Internal(e))
            }
        }
    }
}

/// Matches the partial unique index guarding per-user content dedup.
fn is_hash_conflict(e: &anyhow::Error) -> bool {
    e.to_string().contains("idx_documents_owner_file_hash")
        || e.chain()
            .any(|cause| cause.to_string().contains("idx_documents_owner_file_hash"))
}

/// Pure record construction for a derived document: fresh id, inherited
/// owner (both keys), null hash, conversion tag set.
fn derived_record(
    source: &Document,
    document_id: Uuid,
    stored_path: String,
    file_size: i64,
    spec: DerivedSpec,
) -> NewDocument {
    let file_type = spec
        .file_type
        .unwrap_or_else(|| source.file_type.clone());
    let mime_type = spec
        .mime_type
        .unwrap_or_else(|| source.mime_type.clone());

    NewDocument {
        id: document_id,
        owner_id: source.owner_id,
        owner_email: source.owner_email.clone(),
        filename: spec.filename.clone(),
        original_filename: spec.filename,
        file_path: stored_path,
        file_size,
        mime_type,
        file_type,
        conversion_type: Some(spec.conversion_type.to_string()),
        file_hash: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn source_document() -> Document {
        Document {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            owner_email: Some("owner@example.com".to_string()),
            filename: "report.pdf".to_string(),
            original_filename: "report.pdf".to_string(),
            file_path: "documents/x/report_1.pdf".to_string(),
            file_size: 1024,
            mime_type: "application/pdf".to_string(),
            file_type: "pdf".to_string(),
            conversion_type: None,
            file_hash: Some("abc123".to_string()),
            created_at: Utc::now(),
            last_accessed: Utc::now(),
        }
    }

    #[test]
    fn derived_record_never_carries_a_hash() {
        let source = source_document();
        let record = derived_record(
            &source,
            Uuid::new_v4(),
            "documents/y/watermarked_1.pdf".to_string(),
            2048,
            DerivedSpec {
                filename: "watermarked_report.pdf".to_string(),
                conversion_type: "watermark",
                mime_type: None,
                file_type: None,
            },
        );

        assert!(record.file_hash.is_none());
        assert_eq!(record.conversion_type.as_deref(), Some("watermark"));
    }

    #[test]
    fn derived_record_inherits_owner_and_types_for_edit_ops() {
        let source = source_document();
        let record = derived_record(
            &source,
            Uuid::new_v4(),
            "documents/y/out.pdf".to_string(),
            10,
            DerivedSpec {
                filename: "out.pdf".to_string(),
                conversion_type: "annotate",
                mime_type: None,
                file_type: None,
            },
        );

        assert_eq!(record.owner_id, source.owner_id);
        assert_eq!(record.owner_email, source.owner_email);
        assert_eq!(record.mime_type, source.mime_type);
        assert_eq!(record.file_type, source.file_type);
    }

    #[test]
    fn derived_record_overrides_types_for_format_conversions() {
        let source = source_document();
        let record = derived_record(
            &source,
            Uuid::new_v4(),
            "documents/y/out.epub".to_string(),
            10,
            DerivedSpec {
                filename: "report.epub".to_string(),
                conversion_type: "pdf_to_epub",
                mime_type: Some("application/epub+zip".to_string()),
                file_type: Some("epub".to_string()),
            },
        );

        assert_eq!(record.mime_type, "application/epub+zip");
        assert_eq!(record.file_type, "epub");
        assert!(record.file_hash.is_none());
    }

    #[test]
    fn derived_record_gets_a_fresh_id() {
        let source = source_document();
        let id = Uuid::new_v4();
        let record = derived_record(
            &source,
            id,
            "documents/y/out.pdf".to_string(),
            10,
            DerivedSpec {
                filename: "out.pdf".to_string(),
                conversion_type: "merge",
                mime_type: None,
                file_type: None,
            },
        );

        assert_eq!(record.id, id);
        assert_ne!(record.id, source.id);
    }

    #[test]
    fn hash_conflict_detection_matches_index_name() {
        let err = anyhow::anyhow!(
            "error returned from database: duplicate key value violates unique constraint \"idx_documents_owner_file_hash\""
        );
        assert!(is_hash_conflict(&err));

        let other = anyhow::anyhow!("connection reset");
        assert!(!is_hash_conflict(&other));
    }
}
