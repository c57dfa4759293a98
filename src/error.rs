//! Error types for the launcher.
//!
//! Two families exist. [`ConfigError`] is purely local: the launch file could
//! not be read or decoded and nothing was sent to the runtime. [`RuntimeError`]
//! covers every remote operation (connect, fetch, unpack, container create,
//! task create, task start) and carries the originating cause.

use std::path::PathBuf;

/// Result type alias for launcher operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for runtime client operations.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Top-level error surfaced by a launch.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The launch configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A runtime operation failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl Error {
    /// Returns true for configuration failures.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true for runtime failures.
    pub fn is_runtime(&self) -> bool {
        matches!(self, Self::Runtime(_))
    }
}

/// Errors loading the launch configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for a launch configuration.
    #[error("malformed config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A required field is absent or empty.
    #[error("config is missing required field '{0}'")]
    MissingField(&'static str),
}

/// Errors from the runtime client.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    // =========================================================================
    // Session Errors
    // =========================================================================
    /// Could not establish a session with the runtime.
    #[error("failed to connect to runtime at {address}: {reason}")]
    ConnectFailed { address: String, reason: String },

    /// The requested execution engine cannot be used.
    #[error("runtime engine '{engine}' not available: {reason}")]
    EngineUnavailable { engine: String, reason: String },

    /// The session was already closed.
    #[error("runtime session is closed")]
    SessionClosed,

    /// The namespace cannot be used by this runtime.
    #[error("invalid namespace '{namespace}': {reason}")]
    InvalidNamespace { namespace: String, reason: String },

    /// The operation was cancelled by the caller.
    #[error("{operation} cancelled")]
    Cancelled { operation: String },

    // =========================================================================
    // Image Errors
    // =========================================================================
    /// Failed to parse image reference.
    #[error("invalid image reference '{reference}': {reason}")]
    InvalidImageReference { reference: String, reason: String },

    /// Image pull failed.
    #[error("failed to pull image '{reference}': {reason}")]
    ImagePullFailed { reference: String, reason: String },

    /// Image size exceeded limits.
    #[error("image exceeds size limit: {size} > {limit} bytes")]
    ImageTooLarge { size: u64, limit: u64 },

    /// Layer extraction failed.
    #[error("failed to extract layer {digest}: {reason}")]
    LayerExtractionFailed { digest: String, reason: String },

    /// Path traversal attempt detected in tar archive.
    #[error("path traversal detected in layer: {path}")]
    PathTraversal { path: String },

    /// Snapshotter is not known to the runtime.
    #[error("unsupported snapshotter '{0}'")]
    UnsupportedSnapshotter(String),

    /// Unpack failed for a reason other than a single bad layer.
    #[error("failed to unpack '{reference}' into {snapshotter}: {reason}")]
    UnpackFailed {
        reference: String,
        snapshotter: String,
        reason: String,
    },

    /// A container was requested from an image that was never unpacked.
    #[error("image '{reference}' is not unpacked into snapshotter '{snapshotter}'")]
    NotUnpacked {
        reference: String,
        snapshotter: String,
    },

    // =========================================================================
    // Container / Task Errors
    // =========================================================================
    /// Container ID rejected by the runtime.
    #[error("invalid container ID '{id}': {reason}")]
    InvalidContainerId { id: String, reason: String },

    /// Container already exists in the namespace.
    #[error("container already exists: {0}")]
    ContainerAlreadyExists(String),

    /// Container create failed.
    #[error("failed to create container '{id}': {reason}")]
    CreateFailed { id: String, reason: String },

    /// A security profile named by the spec could not be made available.
    #[error("security profile '{profile}' unavailable: {reason}")]
    SecurityProfileFailed { profile: String, reason: String },

    /// Task create failed.
    #[error("failed to create task for container '{id}': {reason}")]
    TaskCreateFailed { id: String, reason: String },

    /// Task start failed.
    #[error("failed to start task for container '{id}': {reason}")]
    StartFailed { id: String, reason: String },

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Storage initialization failed.
    #[error("failed to initialize storage at {}: {reason}", path.display())]
    StorageInitFailed { path: PathBuf, reason: String },

    /// Blob not found in storage.
    #[error("blob not found: {digest}")]
    BlobNotFound { digest: String },

    /// Storage write failed.
    #[error("failed to write to storage: {0}")]
    StorageWriteFailed(String),

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl RuntimeError {
    /// Builds a cancellation error for the named operation.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Returns true if the error came from caller cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
