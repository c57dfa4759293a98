//! Tests for error types.
//!
//! Validates display formatting, category helpers, and source chaining.

use boss::{ConfigError, Error, LaunchConfig, RuntimeError};
use std::error::Error as _;
use std::path::PathBuf;

// =============================================================================
// Config Errors
// =============================================================================

#[test]
fn test_read_error_names_path() {
    let err = LaunchConfig::load("/nonexistent/boss/app.toml").unwrap_err();
    let msg = err.to_string();

    assert!(matches!(err, ConfigError::Read { .. }));
    assert!(msg.contains("/nonexistent/boss/app.toml"), "{}", msg);
    assert!(err.source().is_some(), "should chain the io error");
}

#[test]
fn test_parse_error_from_str() {
    let err = LaunchConfig::from_toml_str("id = ").unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().starts_with("malformed config"));
}

#[test]
fn test_missing_field_display() {
    let err = ConfigError::MissingField("image");
    assert_eq!(err.to_string(), "config is missing required field 'image'");
}

// =============================================================================
// Runtime Errors
// =============================================================================

#[test]
fn test_runtime_error_display_carries_cause() {
    let err = RuntimeError::ImagePullFailed {
        reference: "repo/app:1.0".to_string(),
        reason: "manifest unknown".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "failed to pull image 'repo/app:1.0': manifest unknown"
    );

    let err = RuntimeError::StartFailed {
        id: "c1".to_string(),
        reason: "runc exited with exit status: 1".to_string(),
    };
    assert!(err.to_string().contains("c1"));
    assert!(err.to_string().contains("exit status: 1"));
}

#[test]
fn test_storage_init_display() {
    let err = RuntimeError::StorageInitFailed {
        path: PathBuf::from("/var/lib/boss/content"),
        reason: "permission denied".to_string(),
    };
    assert_eq!(
        err.to_string(),
        "failed to initialize storage at /var/lib/boss/content: permission denied"
    );
}

#[test]
fn test_io_error_converts() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: RuntimeError = io.into();
    assert!(matches!(err, RuntimeError::Io(_)));
    assert!(err.source().is_some());
}

#[test]
fn test_cancelled_helpers() {
    let err = RuntimeError::cancelled("create task");
    assert!(err.is_cancelled());
    assert_eq!(err.to_string(), "create task cancelled");
    assert!(!RuntimeError::SessionClosed.is_cancelled());
}

// =============================================================================
// Top-level Error
// =============================================================================

#[test]
fn test_top_level_is_transparent() {
    let err: Error = RuntimeError::ContainerAlreadyExists("c1".to_string()).into();
    assert!(err.is_runtime());
    assert_eq!(err.to_string(), "container already exists: c1");

    let err: Error = ConfigError::MissingField("id").into();
    assert!(err.is_config());
    assert_eq!(err.to_string(), "config is missing required field 'id'");
}
