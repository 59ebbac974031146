//! Hasher port
//!
//! Content fingerprinting is SHA-256 everywhere: the remote reports SHA-256
//! fingerprints the local side must be able to verify, so the digest is not
//! negotiable. The port exists so tests can count hash invocations and the
//! change detector can be exercised without touching real files.

use std::path::Path;

use crate::domain::newtypes::Fingerprint;

/// Injected content-fingerprint computer
#[async_trait::async_trait]
pub trait Hasher: Send + Sync {
    /// Digest of an in-memory byte slice
    fn digest_bytes(&self, bytes: &[u8]) -> Fingerprint;

    /// Digest of a file's contents, streamed so large files are never
    /// buffered whole
    async fn digest_file(&self, path: &Path) -> std::io::Result<Fingerprint>;
}

/// Production SHA-256 hasher
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

#[async_trait::async_trait]
impl Hasher for Sha256Hasher {
    fn digest_bytes(&self, bytes: &[u8]) -> Fingerprint {
        Fingerprint::of_bytes(bytes)
    }

    async fn digest_file(&self, path: &Path) -> std::io::Result<Fingerprint> {
        use sha2::{Digest, Sha256};
        use tokio::io::AsyncReadExt;

        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];

        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        // The digest is valid hex by construction.
        Ok(Fingerprint::new(hex::encode(hasher.finalize()))
            .expect("sha256 digest is always valid hex"))
    }
}
