//! Tests for the content store.
//!
//! Validates digest verification, digest parsing, and atomic writes.

use boss::BlobStore;
use boss::storage::sha256_digest;
use std::fs;
use tempfile::TempDir;

// =============================================================================
// Creation
// =============================================================================

#[test]
fn test_open_creates_content_dir() {
    let temp_dir = TempDir::new().unwrap();
    let store = BlobStore::open(temp_dir.path()).unwrap();

    assert_eq!(store.base_dir(), temp_dir.path().join("content"));
    assert!(store.base_dir().is_dir());
}

#[test]
fn test_with_path_creates_nested_dirs() {
    let temp_dir = TempDir::new().unwrap();
    let store_path = temp_dir.path().join("deeply").join("nested").join("blobs");

    let store = BlobStore::with_path(store_path.clone()).unwrap();

    assert!(store_path.exists(), "nested directories should be created");
    assert_eq!(store.base_dir(), store_path);
}

#[test]
fn test_open_fails_on_file() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("not-a-dir");
    fs::write(&file, b"x").unwrap();

    assert!(BlobStore::with_path(file.join("content")).is_err());
}

// =============================================================================
// Blobs
// =============================================================================

#[test]
fn test_sha256_digest_format() {
    assert_eq!(
        sha256_digest(b""),
        "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

#[test]
fn test_put_get_and_open() {
    let temp_dir = TempDir::new().unwrap();
    let store = BlobStore::open(temp_dir.path()).unwrap();

    let data = b"layer bytes";
    let digest = sha256_digest(data);
    store.put_blob(&digest, data).unwrap();

    assert_eq!(store.get_blob(&digest).unwrap(), data);
    let file = store.open_blob(&digest).unwrap();
    assert_eq!(file.metadata().unwrap().len(), data.len() as u64);
}

#[test]
fn test_tampered_content_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let store = BlobStore::open(temp_dir.path()).unwrap();

    let digest = sha256_digest(b"expected");
    assert!(store.put_blob(&digest, b"tampered").is_err());
    assert!(!store.has_blob(&digest));
}

#[test]
fn test_non_sha256_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let store = BlobStore::open(temp_dir.path()).unwrap();

    let digest = format!("sha512:{}", "a".repeat(128));
    assert!(store.put_blob(&digest, b"data").is_err());
}

#[test]
fn test_no_temp_files_left() {
    let temp_dir = TempDir::new().unwrap();
    let store = BlobStore::open(temp_dir.path()).unwrap();

    let data = b"atomic";
    let digest = sha256_digest(data);
    store.put_blob(&digest, data).unwrap();

    let shard = store.blob_path(&digest).unwrap();
    let entries: Vec<_> = fs::read_dir(shard.parent().unwrap())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn test_blob_paths_stay_inside_store() {
    let temp_dir = TempDir::new().unwrap();
    let store = BlobStore::open(temp_dir.path()).unwrap();

    let digest = sha256_digest(b"inside");
    let path = store.blob_path(&digest).unwrap();
    assert!(path.starts_with(store.base_dir()));

    assert!(store.blob_path("sha256:../../../../etc/passwd").is_err());
    assert!(store.get_blob("sha256:../../../../etc/passwd").is_err());
}
