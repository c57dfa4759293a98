//! Tests for constants module.
//!
//! Validates limits, fixed identifiers, and the ID/reference validators.

use boss::constants::*;

// =============================================================================
// Size Limit Tests
// =============================================================================

#[test]
fn test_image_ref_length_reasonable() {
    // "registry.example.com:5000/namespace/image:tag@sha256:<64 hex>"
    assert!(MAX_IMAGE_REF_LEN >= 256, "image ref limit too restrictive");
    assert!(MAX_IMAGE_REF_LEN <= 1024, "image ref limit too permissive");
}

#[test]
fn test_layer_size_reasonable() {
    assert!(
        MAX_LAYER_SIZE >= 100 * 1024 * 1024,
        "layer size limit too restrictive for base images"
    );
    assert!(
        (MAX_LAYER_SIZE as u64) < MAX_ROOTFS_SIZE,
        "a single layer must fit in the rootfs budget"
    );
}

#[test]
fn test_config_blob_limit_below_layer_limit() {
    assert!(MAX_CONFIG_SIZE >= 64 * 1024);
    assert!(MAX_CONFIG_SIZE < MAX_LAYER_SIZE);
}

#[test]
fn test_layers_count_reasonable() {
    // Docker caps images at 127 layers.
    assert!(MAX_LAYERS >= 127);
    assert!(MAX_LAYERS <= 256);
}

// =============================================================================
// Fixed Identifiers
// =============================================================================

#[test]
fn test_restart_labels() {
    assert_eq!(RESTART_STATUS_LABEL, "io.containerd/restart.status");
    assert_eq!(RESTART_LOGPATH_LABEL, "io.containerd/restart.logpath");
    assert_eq!(RESTART_STATUS_RUNNING, "running");
}

#[test]
fn test_launch_defaults() {
    assert_eq!(DEFAULT_RUNTIME, "io.containerd.runc.v1");
    assert_eq!(DEFAULT_NAMESPACE, "boss");
    assert_eq!(DEFAULT_SNAPSHOTTER, "native");
    assert_eq!(DEFAULT_APPARMOR_PROFILE, "boss");
    assert!(DEFAULT_PATH_ENV.starts_with("PATH="));
}

// =============================================================================
// Container ID Validation
// =============================================================================

#[test]
fn test_valid_container_ids() {
    for id in ["c1", "redis", "my-app_v2", "A1-b2-C3", "my.app", "web.v2.internal", "1"] {
        assert!(validate_container_id(id).is_ok(), "rejected {:?}", id);
    }
    assert!(validate_container_id(&"a".repeat(MAX_CONTAINER_ID_LEN)).is_ok());
}

#[test]
fn test_invalid_container_ids() {
    assert_eq!(
        validate_container_id(""),
        Err("container ID cannot be empty")
    );
    assert_eq!(
        validate_container_id(&"a".repeat(MAX_CONTAINER_ID_LEN + 1)),
        Err("container ID exceeds maximum length")
    );
    for id in ["a/b", "has space", "tab\there", "semi;colon"] {
        assert_eq!(
            validate_container_id(id),
            Err("container ID contains invalid characters"),
            "accepted {:?}",
            id
        );
    }
    for id in [".", "..", ".hidden", "trailing.", "-a", "a--b", "a._b"] {
        assert_eq!(
            validate_container_id(id),
            Err("container ID separators must sit between letters or digits"),
            "accepted {:?}",
            id
        );
    }
}

// =============================================================================
// Image Reference Validation
// =============================================================================

#[test]
fn test_valid_image_refs() {
    for reference in [
        "alpine",
        "repo/app:1.0",
        "docker.io/library/redis:alpine",
        "localhost:5000/team/svc:latest",
        "ghcr.io/org/img@sha256:0123456789abcdef",
    ] {
        assert!(validate_image_ref(reference).is_ok(), "rejected {}", reference);
    }
}

#[test]
fn test_invalid_image_refs() {
    assert!(validate_image_ref("").is_err());
    assert!(validate_image_ref(&"a".repeat(MAX_IMAGE_REF_LEN + 1)).is_err());
    assert!(validate_image_ref("repo/app:1.0; rm -rf /").is_err());
    assert!(validate_image_ref("repo/app\n").is_err());
}
