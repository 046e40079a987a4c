//! Integration tests for the local filesystem backend: the full
//! store/retrieve/remove lifecycle against a real temp directory.

use std::io::Write;

use docuvault::storage::local::LocalStorageBackend;
use docuvault::storage::{StorageBackend, StorageError};
use tempfile::TempDir;
use uuid::Uuid;

struct Fixture {
    backend: LocalStorageBackend,
    _base: TempDir,
}

async fn fixture() -> Fixture {
    let base = TempDir::new().unwrap();
    let backend = LocalStorageBackend::new(base.path());
    backend.initialize().await.unwrap();
    Fixture {
        backend,
        _base: base,
    }
}

fn source_file(content: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content).unwrap();
    file
}

#[tokio::test]
async fn store_produces_normalized_document_path() {
    let fx = fixture().await;
    let source = source_file(b"pdf bytes");
    let id = Uuid::new_v4();

    let stored = fx
        .backend
        .store(source.path(), id, "quarterly report.pdf")
        .await
        .unwrap();

    assert!(stored.starts_with(&format!("documents/{}/", id)));
    assert!(stored.ends_with(".pdf"));
    assert_eq!(stored.matches('/').count(), 2);
}

#[tokio::test]
async fn stored_object_round_trips_through_retrieve() {
    let fx = fixture().await;
    let source = source_file(b"original content");

    let stored = fx
        .backend
        .store(source.path(), Uuid::new_v4(), "doc.pdf")
        .await
        .unwrap();

    let retrieved = fx.backend.retrieve(&stored).await.unwrap();
    let bytes = std::fs::read(retrieved.path()).unwrap();
    assert_eq!(bytes, b"original content");
}

#[tokio::test]
async fn repeated_stores_never_collide() {
    let fx = fixture().await;
    let source = source_file(b"same name, different object");
    let id = Uuid::new_v4();

    let first = fx.backend.store(source.path(), id, "doc.pdf").await.unwrap();
    let second = fx.backend.store(source.path(), id, "doc.pdf").await.unwrap();

    assert_ne!(first, second);
    assert!(fx.backend.exists(&first).await.unwrap());
    assert!(fx.backend.exists(&second).await.unwrap());
}

#[tokio::test]
async fn windows_client_filename_stores_cleanly() {
    let fx = fixture().await;
    let source = source_file(b"pdf bytes");
    let id = Uuid::new_v4();

    // the raw filename a Windows browser submits
    let stored = fx
        .backend
        .store(source.path(), id, r"C:\fakepath\doc.pdf")
        .await
        .unwrap();

    assert_eq!(stored.matches('/').count(), 2);
    assert!(!stored.contains('\\'));
    let retrieved = fx.backend.retrieve(&stored).await.unwrap();
    assert_eq!(std::fs::read(retrieved.path()).unwrap(), b"pdf bytes");
}

#[tokio::test]
async fn retrieve_of_missing_object_is_not_found() {
    let fx = fixture().await;
    let missing = format!("documents/{}/gone.pdf", Uuid::new_v4());

    let err = fx.backend.retrieve(&missing).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }));
}

#[tokio::test]
async fn malformed_path_is_rejected_before_touching_the_filesystem() {
    let fx = fixture().await;

    for path in [
        "not-documents/abc/file.pdf",
        "documents/file.pdf",
        "documents/abc/extra/file.pdf",
        "",
    ] {
        let err = fx.backend.retrieve(path).await.unwrap_err();
        assert!(
            matches!(err, StorageError::MalformedPath { .. }),
            "expected malformed path for {:?}",
            path
        );
    }
}

#[tokio::test]
async fn backslashes_are_normalized_before_parsing() {
    let fx = fixture().await;
    let source = source_file(b"content");
    let id = Uuid::new_v4();

    let stored = fx.backend.store(source.path(), id, "doc.pdf").await.unwrap();
    let windows_style = stored.replace('/', "\\");

    let retrieved = fx.backend.retrieve(&windows_style).await.unwrap();
    assert_eq!(std::fs::read(retrieved.path()).unwrap(), b"content");
}

#[tokio::test]
async fn remove_reports_whether_an_object_was_deleted() {
    let fx = fixture().await;
    let source = source_file(b"content");

    let stored = fx
        .backend
        .store(source.path(), Uuid::new_v4(), "doc.pdf")
        .await
        .unwrap();

    assert!(fx.backend.remove(&stored).await.unwrap());
    // second removal finds nothing; that is not an error
    assert!(!fx.backend.remove(&stored).await.unwrap());
    assert!(!fx.backend.exists(&stored).await.unwrap());
}

#[tokio::test]
async fn store_failure_leaves_the_source_file_in_place() {
    let fx = fixture().await;
    let source = source_file(b"survives");

    // missing source triggers the failure path
    let bogus = source.path().with_extension("missing");
    let result = fx.backend.store(&bogus, Uuid::new_v4(), "doc.pdf").await;
    assert!(result.is_err());

    // the original upload is untouched and can be retried
    assert_eq!(std::fs::read(source.path()).unwrap(), b"survives");
}
