//! # Content Store
//!
//! Blobs (image configs and layers) are stored by digest under the state
//! root:
//!
//! ```text
//! <root>/content/
//! └── sha256/
//!     ├── ab/
//!     │   └── abcd1234...
//!     └── cd/
//!         └── cdef5678...
//! ```
//!
//! The first two hex characters shard the directory.
//!
//! ## Integrity
//!
//! [`BlobStore::put_blob`] hashes the content and rejects it unless it
//! matches the digest it is stored under. Only `sha256` is accepted, so every
//! stored blob has been verified.
//!
//! Digests are validated before any path is built from them. A digest with an
//! unknown algorithm or a non-hex hash is an error, never a path.
//!
//! Writes go to a uniquely named temp file and are renamed into place, so a
//! crashed or concurrent writer never leaves a partial blob behind.

use crate::constants::BLOB_STORE_DIR;
use crate::error::{RuntimeError, RuntimeResult};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Returns the `sha256:<hex>` digest of `data`.
pub fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

/// Content-addressed blob store.
///
/// Each operation is independent; concurrent writers of the same blob race
/// only on the final rename, and both write identical content.
#[derive(Debug, Clone)]
pub struct BlobStore {
    base_dir: PathBuf,
}

impl BlobStore {
    /// Opens the content store under a state root, creating it if needed.
    pub fn open(root: &Path) -> RuntimeResult<Self> {
        Self::with_path(root.join(BLOB_STORE_DIR))
    }

    /// Opens a blob store at the given directory.
    pub fn with_path(base_dir: PathBuf) -> RuntimeResult<Self> {
        fs::create_dir_all(&base_dir).map_err(|e| RuntimeError::StorageInitFailed {
            path: base_dir.clone(),
            reason: e.to_string(),
        })?;

        info!("Content store at {}", base_dir.display());
        Ok(Self { base_dir })
    }

    /// Returns the base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Checks if a blob exists. Malformed digests never exist.
    pub fn has_blob(&self, digest: &str) -> bool {
        self.blob_path(digest).is_ok_and(|p| p.is_file())
    }

    /// Reads a blob into memory.
    pub fn get_blob(&self, digest: &str) -> RuntimeResult<Vec<u8>> {
        let path = self.blob_path(digest)?;
        fs::read(&path).map_err(|_| RuntimeError::BlobNotFound {
            digest: digest.to_string(),
        })
    }

    /// Opens a blob for streaming reads.
    pub fn open_blob(&self, digest: &str) -> RuntimeResult<fs::File> {
        let path = self.blob_path(digest)?;
        fs::File::open(&path).map_err(|_| RuntimeError::BlobNotFound {
            digest: digest.to_string(),
        })
    }

    /// Returns the on-disk path of a blob.
    ///
    /// Fails for anything other than `sha256:<64 hex chars>`.
    pub fn blob_path(&self, digest: &str) -> RuntimeResult<PathBuf> {
        let hash = parse_sha256(digest)?;
        Ok(self.base_dir.join("sha256").join(&hash[..2]).join(hash))
    }

    /// Stores a blob after verifying its content matches the digest.
    pub fn put_blob(&self, digest: &str, data: &[u8]) -> RuntimeResult<()> {
        let expected = parse_sha256(digest)?;
        let computed = hex::encode(Sha256::digest(data));

        if computed != expected {
            return Err(RuntimeError::StorageWriteFailed(format!(
                "digest mismatch: expected {}, computed {}",
                expected, computed
            )));
        }

        let path = self.blob_path(digest)?;
        if path.exists() {
            debug!("Blob {} already exists", digest);
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| RuntimeError::StorageWriteFailed(e.to_string()))?;
        }

        let temp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::now_v7()));
        fs::write(&temp_path, data).map_err(|e| RuntimeError::StorageWriteFailed(e.to_string()))?;
        fs::rename(&temp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            RuntimeError::StorageWriteFailed(e.to_string())
        })?;

        debug!("Stored blob {} ({} bytes, verified)", digest, data.len());
        Ok(())
    }
}

/// Validates a `sha256:<hex>` digest and returns the lowercase hash.
fn parse_sha256(digest: &str) -> RuntimeResult<&str> {
    let invalid = |reason: &str| {
        RuntimeError::StorageWriteFailed(format!("invalid digest '{}': {}", digest, reason))
    };

    let (algo, hash) = digest
        .split_once(':')
        .ok_or_else(|| invalid("missing algorithm"))?;
    if algo != "sha256" {
        return Err(invalid("only sha256 is supported"));
    }
    if hash.len() != 64 || !hash.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err(invalid("hash must be 64 lowercase hex characters"));
    }
    Ok(hash)
}
