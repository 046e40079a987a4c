//! Reconciler policy tests: per-user dedup, insert-race recovery, the
//! ownership predicate, and orphan self-healing, run against the real local
//! storage backend and an in-memory document store standing in for Postgres.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;
use uuid::Uuid;

use docuvault::error::AppError;
use docuvault::ingestion::{DerivedSpec, DocumentReconciler, DocumentStore};
use docuvault::models::{Document, NewDocument, User};
use docuvault::storage::local::LocalStorageBackend;
use docuvault::storage::StorageBackend;

const HASH_INDEX_VIOLATION: &str =
    "duplicate key value violates unique constraint \"idx_documents_owner_file_hash\"";

#[derive(Default)]
struct Inner {
    documents: Mutex<HashMap<Uuid, Document>>,
    lose_next_insert_race: AtomicBool,
}

/// Hash-unique document store with the same observable behavior as the
/// `documents` table: the partial unique index on `(owner_id, file_hash)`
/// raises the constraint-violation message the reconciler matches on.
#[derive(Clone, Default)]
struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    fn lose_next_insert_race(&self) {
        self.inner.lose_next_insert_race.store(true, Ordering::SeqCst);
    }

    fn row(&self, id: Uuid) -> Option<Document> {
        self.inner.documents.lock().unwrap().get(&id).cloned()
    }

    fn row_count(&self) -> usize {
        self.inner.documents.lock().unwrap().len()
    }

    fn insert_raw(&self, document: Document) {
        self.inner
            .documents
            .lock()
            .unwrap()
            .insert(document.id, document);
    }
}

fn materialize(doc: NewDocument) -> Document {
    Document {
        id: doc.id,
        owner_id: doc.owner_id,
        owner_email: doc.owner_email,
        filename: doc.filename,
        original_filename: doc.original_filename,
        file_path: doc.file_path,
        file_size: doc.file_size,
        mime_type: doc.mime_type,
        file_type: doc.file_type,
        conversion_type: doc.conversion_type,
        file_hash: doc.file_hash,
        created_at: Utc::now(),
        last_accessed: Utc::now(),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_document(&self, doc: NewDocument) -> Result<Document> {
        if self.inner.lose_next_insert_race.swap(false, Ordering::SeqCst) {
            // a concurrent upload with the same bytes committed first
            let mut winner = materialize(doc);
            winner.id = Uuid::new_v4();
            winner.file_path = format!("documents/{}/winner.pdf", winner.id);
            self.insert_raw(winner);
            anyhow::bail!(HASH_INDEX_VIOLATION);
        }

        let mut documents = self.inner.documents.lock().unwrap();
        if let Some(hash) = &doc.file_hash {
            let collides = documents
                .values()
                .any(|d| d.owner_id == doc.owner_id && d.file_hash.as_ref() == Some(hash));
            if collides {
                anyhow::bail!(HASH_INDEX_VIOLATION);
            }
        }

        let document = materialize(doc);
        documents.insert(document.id, document.clone());
        Ok(document)
    }

    async fn get_owned_document(
        &self,
        document_id: Uuid,
        owner_id: Uuid,
        owner_email: &str,
    ) -> Result<Option<Document>> {
        let documents = self.inner.documents.lock().unwrap();
        Ok(documents.get(&document_id).cloned().filter(|d| {
            d.owner_id == owner_id || d.owner_email.as_deref() == Some(owner_email)
        }))
    }

    async fn get_document_by_owner_and_hash(
        &self,
        owner_id: Uuid,
        file_hash: &str,
    ) -> Result<Option<Document>> {
        let documents = self.inner.documents.lock().unwrap();
        Ok(documents
            .values()
            .find(|d| d.owner_id == owner_id && d.file_hash.as_deref() == Some(file_hash))
            .cloned())
    }

    async fn touch_last_accessed(&self, document_id: Uuid) -> Result<()> {
        if let Some(doc) = self.inner.documents.lock().unwrap().get_mut(&document_id) {
            doc.last_accessed = Utc::now();
        }
        Ok(())
    }

    async fn delete_document(&self, document_id: Uuid) -> Result<bool> {
        Ok(self
            .inner
            .documents
            .lock()
            .unwrap()
            .remove(&document_id)
            .is_some())
    }
}

struct Fixture {
    reconciler: DocumentReconciler,
    store: MemoryStore,
    storage: Arc<dyn StorageBackend>,
    _base: TempDir,
}

async fn fixture() -> Fixture {
    let base = TempDir::new().unwrap();
    let storage: Arc<dyn StorageBackend> = Arc::new(LocalStorageBackend::new(base.path()));
    storage.initialize().await.unwrap();
    let store = MemoryStore::default();
    Fixture {
        reconciler: DocumentReconciler::new(store.clone(), storage.clone()),
        store,
        storage,
        _base: base,
    }
}

fn user(email: &str) -> User {
    User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        password_hash: String::new(),
        is_active: true,
        created_at: Utc::now(),
    }
}

fn upload_file(content: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content).unwrap();
    file
}

#[tokio::test]
async fn same_user_duplicate_upload_conflicts_with_existing_id() {
    let fx = fixture().await;
    let owner = user("alice@example.com");
    let upload = upload_file(b"identical bytes");

    let first = fx
        .reconciler
        .ingest_upload(&owner, upload.path(), "report.pdf", "application/pdf")
        .await
        .unwrap();

    let err = fx
        .reconciler
        .ingest_upload(&owner, upload.path(), "renamed.pdf", "application/pdf")
        .await
        .unwrap_err();

    match err {
        AppError::DuplicateContent { existing_id } => assert_eq!(existing_id, first.id),
        other => panic!("expected DuplicateContent, got {:?}", other),
    }
    // the pre-check fires before store, so only the first object exists
    assert_eq!(fx.store.row_count(), 1);
    assert!(fx.storage.exists(&first.file_path).await.unwrap());
}

#[tokio::test]
async fn different_users_uploading_identical_bytes_get_independent_documents() {
    let fx = fixture().await;
    let alice = user("alice@example.com");
    let bob = user("bob@example.com");
    let upload = upload_file(b"shared bytes");

    let a = fx
        .reconciler
        .ingest_upload(&alice, upload.path(), "doc.pdf", "application/pdf")
        .await
        .unwrap();
    let b = fx
        .reconciler
        .ingest_upload(&bob, upload.path(), "doc.pdf", "application/pdf")
        .await
        .unwrap();

    assert_ne!(a.id, b.id);
    assert_eq!(a.file_hash, b.file_hash);
    assert_eq!(fx.store.row_count(), 2);
}

#[tokio::test]
async fn lost_insert_race_recovers_to_conflict_and_drops_the_orphan_object() {
    let fx = fixture().await;
    let owner = user("alice@example.com");
    let upload = upload_file(b"racing bytes");

    fx.store.lose_next_insert_race();
    let err = fx
        .reconciler
        .ingest_upload(&owner, upload.path(), "doc.pdf", "application/pdf")
        .await
        .unwrap_err();

    let winner_id = match err {
        AppError::DuplicateContent { existing_id } => existing_id,
        other => panic!("expected DuplicateContent, got {:?}", other),
    };
    let winner = fx.store.row(winner_id).expect("winner row exists");
    assert_eq!(winner.owner_id, owner.id);

    // the loser's freshly stored object was cleaned up; only the winner's
    // (never materialized) path remains referenced
    assert_eq!(fx.store.row_count(), 1);
    let documents_dir = fx._base.path().join("documents");
    let leftovers = std::fs::read_dir(&documents_dir).unwrap().count();
    assert_eq!(leftovers, 0, "loser object should have been removed");
}

#[tokio::test]
async fn owner_email_predicate_admits_rows_with_a_different_owner_id() {
    let fx = fixture().await;
    let caller = user("alice@example.com");

    // legacy row written under an older account id but the same email
    let legacy_id = Uuid::new_v4();
    fx.store.insert_raw(Document {
        id: legacy_id,
        owner_id: Uuid::new_v4(),
        owner_email: Some(caller.email.clone()),
        filename: "old.pdf".to_string(),
        original_filename: "old.pdf".to_string(),
        file_path: format!("documents/{}/old.pdf", legacy_id),
        file_size: 10,
        mime_type: "application/pdf".to_string(),
        file_type: "pdf".to_string(),
        conversion_type: None,
        file_hash: Some("legacyhash".to_string()),
        created_at: Utc::now(),
        last_accessed: Utc::now(),
    });

    let resolved = fx
        .reconciler
        .resolve_document(&caller, legacy_id)
        .await
        .unwrap();
    assert_eq!(resolved.id, legacy_id);

    let stranger = user("mallory@example.com");
    let err = fx
        .reconciler
        .resolve_document(&stranger, legacy_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DocumentNotFound));
}

#[tokio::test]
async fn missing_backing_object_self_heals_the_record() {
    let fx = fixture().await;
    let owner = user("alice@example.com");
    let upload = upload_file(b"soon to vanish");

    let document = fx
        .reconciler
        .ingest_upload(&owner, upload.path(), "doc.pdf", "application/pdf")
        .await
        .unwrap();

    // the object disappears out of band
    assert!(fx.storage.remove(&document.file_path).await.unwrap());

    let err = fx
        .reconciler
        .resolve_file(&owner, document.id)
        .await
        .unwrap_err();
    match err {
        AppError::FileGone { document_id } => assert_eq!(document_id, document.id),
        other => panic!("expected FileGone, got {:?}", other),
    }

    // the stale record was deleted inside the failed access
    assert!(fx.store.row(document.id).is_none());
    let err = fx
        .reconciler
        .resolve_document(&owner, document.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DocumentNotFound));
}

#[tokio::test]
async fn upload_access_delete_lifecycle() {
    let fx = fixture().await;
    let owner = user("alice@example.com");
    let upload = upload_file(b"lifecycle bytes");

    let document = fx
        .reconciler
        .ingest_upload(&owner, upload.path(), "doc.pdf", "application/pdf")
        .await
        .unwrap();

    let (resolved, file) = fx
        .reconciler
        .resolve_file(&owner, document.id)
        .await
        .unwrap();
    assert_eq!(resolved.id, document.id);
    assert_eq!(std::fs::read(file.path()).unwrap(), b"lifecycle bytes");

    fx.reconciler
        .delete_document(&owner, document.id)
        .await
        .unwrap();

    assert!(fx.store.row(document.id).is_none());
    assert!(!fx.storage.exists(&document.file_path).await.unwrap());
}

#[tokio::test]
async fn derived_documents_persist_without_a_hash() {
    let fx = fixture().await;
    let owner = user("alice@example.com");
    let upload = upload_file(b"source bytes");

    let source = fx
        .reconciler
        .ingest_upload(&owner, upload.path(), "doc.pdf", "application/pdf")
        .await
        .unwrap();

    let output = upload_file(b"converted bytes");
    let derived = fx
        .reconciler
        .create_derived(
            &source,
            output.path(),
            DerivedSpec {
                filename: "watermarked_doc.pdf".to_string(),
                conversion_type: "watermark",
                mime_type: None,
                file_type: None,
            },
        )
        .await
        .unwrap();

    assert!(derived.file_hash.is_none());
    assert_eq!(derived.owner_id, owner.id);
    assert!(fx.storage.exists(&derived.file_path).await.unwrap());

    // hash-less rows sit outside dedup: re-uploading the converted bytes
    // succeeds rather than conflicting
    let reupload = fx
        .reconciler
        .ingest_upload(&owner, output.path(), "converted.pdf", "application/pdf")
        .await
        .unwrap();
    assert_ne!(reupload.id, derived.id);
}
