//! # Launcher Constants
//!
//! Well-known defaults for the runtime connection, restart metadata labels,
//! security presets, and the bounds the local runtime enforces while pulling
//! and unpacking images.
//!
//! ## Cross-References
//!
//! - [`crate::launch`]: Uses the default engine, snapshotter and label keys
//! - [`crate::opts`]: Uses the security preset names
//! - [`crate::registry`]: Uses size limits for image pulling
//! - [`crate::snapshot`]: Uses size limits for layer extraction
//! - [`crate::local`]: Uses storage paths and container ID validation

// =============================================================================
// Runtime Connection
// =============================================================================

/// Default runtime address.
///
/// For the local runtime this is the state root holding the content store,
/// snapshots and per-namespace container records.
pub const DEFAULT_ADDRESS: &str = "/var/lib/boss";

/// Default execution engine identifier.
///
/// Engine identifiers follow `io.containerd.<name>.<version>`; the local
/// runtime executes the `<name>` binary.
pub const DEFAULT_RUNTIME: &str = "io.containerd.runc.v1";

/// Default runtime namespace.
pub const DEFAULT_NAMESPACE: &str = "boss";

/// Default base directory for the restart log-path label.
pub const DEFAULT_LOG_DIR: &str = "/var/log/boss";

/// Default snapshotter images are unpacked onto.
pub const DEFAULT_SNAPSHOTTER: &str = "native";

// =============================================================================
// Restart Metadata
// =============================================================================
//
// Labels written on the container object. They are the only state this tool
// persists and are read by an external restart supervisor.
// =============================================================================

/// Label holding the desired restart status.
pub const RESTART_STATUS_LABEL: &str = "io.containerd/restart.status";

/// Label holding the log file path for a restarted container.
pub const RESTART_LOGPATH_LABEL: &str = "io.containerd/restart.logpath";

/// Restart status written at launch.
pub const RESTART_STATUS_RUNNING: &str = "running";

// =============================================================================
// Security Presets
// =============================================================================

/// Name of the default AppArmor profile applied to every container.
pub const DEFAULT_APPARMOR_PROFILE: &str = "boss";

// =============================================================================
// Size Limits
// =============================================================================
//
// The cumulative worst-case is:
//   MAX_LAYERS × MAX_LAYER_SIZE = 128 × 512 MiB = 64 GiB (compressed)
// MAX_ROOTFS_SIZE (4 GiB) provides the actual extraction bound.
// =============================================================================

/// Maximum OCI image reference length in bytes.
pub const MAX_IMAGE_REF_LEN: usize = 512;

/// Maximum size of a single compressed OCI layer (512 MiB).
///
/// **Security**: Each layer is validated against this limit before it is
/// written to blob storage.
pub const MAX_LAYER_SIZE: usize = 512 * 1024 * 1024;

/// Maximum total extracted rootfs size (4 GiB).
///
/// **Security**: Enforced during tar extraction, accumulating across all
/// layers. Bounds compression bombs.
pub const MAX_ROOTFS_SIZE: u64 = 4 * 1024 * 1024 * 1024;

/// Maximum number of layers in an OCI image.
pub const MAX_LAYERS: usize = 128;

/// Maximum image config blob size (1 MiB).
pub const MAX_CONFIG_SIZE: usize = 1024 * 1024;

// =============================================================================
// Storage Paths
// =============================================================================
//
// Subdirectories of the runtime address.
// =============================================================================

/// Content store for blobs.
pub const BLOB_STORE_DIR: &str = "content";

/// Committed image snapshots, one directory per snapshotter.
pub const SNAPSHOTS_DIR: &str = "snapshots";

/// Per-namespace container records.
pub const CONTAINERS_DIR: &str = "containers";

// =============================================================================
// OCI Spec
// =============================================================================

/// OCI Runtime Spec version written into `config.json`.
pub const OCI_RUNTIME_SPEC_VERSION: &str = "1.0.2";

/// PATH used when the image does not set one.
pub const DEFAULT_PATH_ENV: &str =
    "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

// =============================================================================
// Validation Patterns
// =============================================================================

/// Valid characters for OCI image references.
///
/// The `@` is for digest references like `nginx@sha256:abc...`.
/// The `:` is for tag references like `nginx:latest`.
pub const IMAGE_REF_VALID_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_./:@";

/// Valid characters for container IDs.
///
/// **Security**: Excludes `/` because container IDs become directory names
/// under the runtime address. `.` is only allowed between alphanumerics, so
/// `.` and `..` are never valid IDs.
pub const CONTAINER_NAME_VALID_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_.";

/// Maximum container ID length.
pub const MAX_CONTAINER_ID_LEN: usize = 128;

/// Validates a container ID for use as a path component.
///
/// IDs are runs of ASCII alphanumerics joined by single `.`, `_` or `-`
/// separators (`my.app`, `redis_cache-01`). Returns `Err(reason)` describing
/// the first failed rule.
#[inline]
#[must_use = "validation result must be checked to ensure container ID is safe"]
pub fn validate_container_id(id: &str) -> std::result::Result<(), &'static str> {
    if id.is_empty() {
        return Err("container ID cannot be empty");
    }
    if id.len() > MAX_CONTAINER_ID_LEN {
        return Err("container ID exceeds maximum length");
    }
    if !id.chars().all(|c| CONTAINER_NAME_VALID_CHARS.contains(c)) {
        return Err("container ID contains invalid characters");
    }
    let is_separator = |c: char| !c.is_ascii_alphanumeric();
    let bad_edges = id.starts_with(is_separator) || id.ends_with(is_separator);
    let doubled = id
        .as_bytes()
        .windows(2)
        .any(|w| is_separator(w[0] as char) && is_separator(w[1] as char));
    if bad_edges || doubled {
        return Err("container ID separators must sit between letters or digits");
    }
    Ok(())
}

/// Validates an image reference's length and character set.
#[must_use = "validation result must be checked before pulling"]
pub fn validate_image_ref(reference: &str) -> std::result::Result<(), String> {
    if reference.is_empty() {
        return Err("reference cannot be empty".to_string());
    }
    if reference.len() > MAX_IMAGE_REF_LEN {
        return Err(format!("exceeds {} bytes", MAX_IMAGE_REF_LEN));
    }
    if !reference.chars().all(|c| IMAGE_REF_VALID_CHARS.contains(c)) {
        return Err("contains invalid characters".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_container_id() {
        assert!(validate_container_id("c1").is_ok());
        assert!(validate_container_id("redis_cache-01").is_ok());
        assert!(validate_container_id("my.app").is_ok());
        assert!(validate_container_id("").is_err());
        assert!(validate_container_id(".").is_err());
        assert!(validate_container_id("..").is_err());
        assert!(validate_container_id("../etc").is_err());
        assert!(validate_container_id("a/b").is_err());
        assert!(validate_container_id(&"x".repeat(MAX_CONTAINER_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_image_ref() {
        assert!(validate_image_ref("repo/app:1.0").is_ok());
        assert!(validate_image_ref("docker.io/library/alpine@sha256:abcd").is_ok());
        assert!(validate_image_ref("nginx :latest").is_err());
        assert!(validate_image_ref("").is_err());
        assert!(validate_image_ref(&"a".repeat(MAX_IMAGE_REF_LEN + 1)).is_err());
    }
}
