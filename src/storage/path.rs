//! Canonical storage path handling.
//!
//! Stored objects are addressed as `documents/<document-id>/<filename>`,
//! forward-slash separated regardless of host OS. Everything that touches a
//! stored path goes through `normalize` first so that records written on
//! Windows resolve on Unix and vice versa.

use uuid::Uuid;

use super::StorageError;

/// Canonicalize separators: backslashes become forward slashes, repeated
/// separators collapse. Idempotent and pure.
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_sep = false;
    for ch in path.chars() {
        let is_sep = ch == '/' || ch == '\\';
        if is_sep {
            if !prev_sep {
                out.push('/');
            }
        } else {
            out.push(ch);
        }
        prev_sep = is_sep;
    }
    out
}

/// A validated storage path split into its segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePath {
    pub document_id: String,
    pub filename: String,
}

/// Parse a storage path, enforcing the exact
/// `documents/<document-id>/<filename>` shape. Any other shape is a data
/// integrity bug, not a user error.
pub fn parse(path: &str) -> Result<StoragePath, StorageError> {
    let normalized = normalize(path);
    let parts: Vec<&str> = normalized.split('/').collect();

    if parts.len() != 3 || parts[0] != "documents" || parts[1].is_empty() || parts[2].is_empty() {
        return Err(StorageError::MalformedPath {
            path: path.to_string(),
        });
    }

    Ok(StoragePath {
        document_id: parts[1].to_string(),
        filename: parts[2].to_string(),
    })
}

/// Collision-resistant object name: `<stem>_<uuid><ext>`.
///
/// Client filenames may arrive as full Windows paths (the browser
/// `C:\fakepath\` form); only the last component survives, so the produced
/// name can never introduce extra path segments.
pub fn unique_object_name(logical_name: &str) -> String {
    let leaf = logical_name
        .rsplit(['/', '\\'])
        .find(|part| !part.is_empty())
        .unwrap_or("file");
    let path = std::path::Path::new(leaf);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}_{}.{}", stem, Uuid::new_v4(), ext),
        None => format!("{}_{}", stem, Uuid::new_v4()),
    }
}

/// Storage path for a fresh object belonging to `document_id`.
pub fn storage_path_for(document_id: Uuid, logical_name: &str) -> String {
    format!("documents/{}/{}", document_id, unique_object_name(logical_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_converts_backslashes() {
        assert_eq!(normalize(r"documents\abc\file.pdf"), "documents/abc/file.pdf");
    }

    #[test]
    fn normalize_collapses_repeated_separators() {
        assert_eq!(normalize("documents//abc///file.pdf"), "documents/abc/file.pdf");
        assert_eq!(normalize(r"documents\\abc\/file.pdf"), "documents/abc/file.pdf");
    }

    #[test]
    fn normalize_is_idempotent() {
        let inputs = [
            r"documents\abc\file.pdf",
            "documents//abc/file.pdf",
            "documents/abc/file.pdf",
            r"a\\b//c\d",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once, "normalize(normalize({:?}))", input);
        }
    }

    #[test]
    fn parse_accepts_three_segment_document_paths() {
        let parsed = parse("documents/42/report.pdf").unwrap();
        assert_eq!(parsed.document_id, "42");
        assert_eq!(parsed.filename, "report.pdf");
    }

    #[test]
    fn parse_accepts_backslash_paths() {
        let parsed = parse(r"documents\42\report.pdf").unwrap();
        assert_eq!(parsed.filename, "report.pdf");
    }

    #[test]
    fn parse_rejects_wrong_shapes() {
        for bad in [
            "report.pdf",
            "documents/report.pdf",
            "documents/42/sub/report.pdf",
            "uploads/42/report.pdf",
            "documents//report.pdf",
        ] {
            assert!(
                matches!(parse(bad), Err(StorageError::MalformedPath { .. })),
                "expected MalformedPath for {:?}",
                bad
            );
        }
    }

    #[test]
    fn unique_object_name_keeps_stem_and_extension() {
        let name = unique_object_name("invoice.pdf");
        assert!(name.starts_with("invoice_"));
        assert!(name.ends_with(".pdf"));
    }

    #[test]
    fn unique_object_name_differs_per_call() {
        assert_ne!(unique_object_name("a.pdf"), unique_object_name("a.pdf"));
    }

    #[test]
    fn unique_object_name_drops_path_components() {
        let name = unique_object_name(r"C:\fakepath\doc.pdf");
        assert!(name.starts_with("doc_"));
        assert!(name.ends_with(".pdf"));
        assert!(!name.contains('\\'));

        let name = unique_object_name("uploads/2024/scan.jpg");
        assert!(name.starts_with("scan_"));
        assert!(!name.contains('/'));
    }

    #[test]
    fn storage_path_for_stays_parseable_with_windows_client_names() {
        let id = Uuid::new_v4();
        let path = storage_path_for(id, r"C:\fakepath\doc.pdf");
        let parsed = parse(&path).unwrap();
        assert_eq!(parsed.document_id, id.to_string());
        assert!(parsed.filename.ends_with(".pdf"));
    }

    #[test]
    fn storage_path_for_produces_parseable_paths() {
        let id = Uuid::new_v4();
        let path = storage_path_for(id, "scan.jpg");
        let parsed = parse(&path).unwrap();
        assert_eq!(parsed.document_id, id.to_string());
    }
}
