//! Content hashing for upload deduplication.

use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

const CHUNK_SIZE: usize = 64 * 1024;

/// SHA-256 of a file's bytes, streamed in fixed-size chunks, hex-encoded.
///
/// The dedup key built from this digest is `(digest, owner_id)`, never the
/// digest alone: two users uploading identical bytes get independent
/// documents.
pub async fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::hash_file;
    use std::io::Write;

    #[tokio::test]
    async fn hashes_match_known_sha256() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();

        let digest = hash_file(file.path()).await.unwrap();
        // sha256("hello world")
        assert_eq!(
            digest,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn identical_content_hashes_identically() {
        let mut a = tempfile::NamedTempFile::new().unwrap();
        let mut b = tempfile::NamedTempFile::new().unwrap();
        a.write_all(b"same bytes").unwrap();
        b.write_all(b"same bytes").unwrap();

        assert_eq!(
            hash_file(a.path()).await.unwrap(),
            hash_file(b.path()).await.unwrap()
        );
    }

    #[tokio::test]
    async fn chunked_hashing_handles_large_files() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        // larger than one chunk so the loop runs more than once
        let data = vec![0xABu8; 200 * 1024];
        file.write_all(&data).unwrap();

        let streamed = hash_file(file.path()).await.unwrap();

        use sha2::{Digest, Sha256};
        let expected = format!("{:x}", Sha256::digest(&data));
        assert_eq!(streamed, expected);
    }
}
