//! Runtime client facade.
//!
//! The narrow set of remote operations a launch needs, independent of any
//! one runtime implementation:
//!
//! ```text
//! connect → fetch_image → unpack → create_container → create_task → start_task
//!                                                                      close
//! ```
//!
//! Resources created inside the runtime (images, snapshots, containers,
//! tasks) are owned by the runtime. Callers hold handles that only name
//! them. Nothing here deletes a container or task.
//!
//! # Implementations
//!
//! - [`LocalConnector`](crate::local::LocalConnector): local state root plus
//!   an OCI runtime binary (`runc`, `crun`, ...)

use crate::error::{RuntimeError, RuntimeResult};
use crate::opts::SpecOpt;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::future::Future;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Session
// =============================================================================

/// Options for opening a runtime session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Runtime address.
    pub address: String,
    /// Execution engine used when a container does not name one.
    pub default_runtime: String,
}

impl ConnectOptions {
    /// Creates connect options.
    pub fn new(address: impl Into<String>, default_runtime: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            default_runtime: default_runtime.into(),
        }
    }
}

/// Per-call context: the runtime namespace and the caller's cancellation.
#[derive(Debug, Clone)]
pub struct Context {
    namespace: String,
    cancel: CancellationToken,
}

impl Context {
    /// Creates a context that is never cancelled.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self::with_cancellation(namespace, CancellationToken::new())
    }

    /// Creates a context tied to the caller's cancellation token.
    pub fn with_cancellation(namespace: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            namespace: namespace.into(),
            cancel,
        }
    }

    /// Runtime namespace operations act in.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns true once the caller has cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Runs a remote call, aborting it if the caller cancels first.
    ///
    /// The in-flight future is dropped on cancellation and the call fails
    /// with [`RuntimeError::Cancelled`].
    pub async fn run<T, F>(&self, operation: &str, call: F) -> RuntimeResult<T>
    where
        F: Future<Output = RuntimeResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RuntimeError::cancelled(operation)),
            result = call => result,
        }
    }
}

// =============================================================================
// Handles
// =============================================================================

/// Process defaults embedded in an image's config blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageConfig {
    /// `KEY=value` entries.
    pub env: Vec<String>,
    /// Entrypoint, prepended to `cmd`.
    pub entrypoint: Vec<String>,
    /// Default command.
    pub cmd: Vec<String>,
    /// Working directory.
    pub working_dir: Option<String>,
    /// User, as `uid[:gid]` or a name.
    pub user: Option<String>,
}

/// Metadata about an OCI image layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerInfo {
    /// Layer digest.
    pub digest: String,
    /// Layer size in bytes.
    pub size: u64,
    /// Media type.
    pub media_type: String,
}

/// Handle to a fetched, content-addressed image.
///
/// `layers` is ordered bottom-to-top. All digests reference blobs in the
/// runtime's content store. Unpacking records the snapshotter on the handle.
#[derive(Debug, Clone)]
pub struct ImageHandle {
    /// Original image reference.
    pub reference: String,
    /// Resolved manifest digest.
    pub digest: String,
    /// Platform this image is for.
    pub platform: String,
    /// Layers in application order.
    pub layers: Vec<LayerInfo>,
    /// Config blob digest.
    pub config_digest: String,
    /// Parsed image config.
    pub config: ImageConfig,
    unpacked_into: Option<String>,
}

impl ImageHandle {
    /// Creates a handle for a fetched image.
    pub fn new(reference: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            digest: digest.into(),
            platform: String::new(),
            layers: Vec::new(),
            config_digest: String::new(),
            config: ImageConfig::default(),
            unpacked_into: None,
        }
    }

    /// Records that the image's layers are materialised on `snapshotter`.
    pub fn mark_unpacked(&mut self, snapshotter: &str) {
        self.unpacked_into = Some(snapshotter.to_string());
    }

    /// Returns true if the image is unpacked on `snapshotter`.
    pub fn is_unpacked(&self, snapshotter: &str) -> bool {
        self.unpacked_into.as_deref() == Some(snapshotter)
    }
}

/// I/O wiring for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IoConfig {
    /// Discard all stdio; nothing attaches to the process.
    #[default]
    Null,
}

/// Request to create a container object.
#[derive(Debug, Clone)]
pub struct NewContainer<'a> {
    /// Container ID.
    pub id: String,
    /// Spec options, applied in order over the runtime's default spec.
    pub spec_opts: Vec<SpecOpt>,
    /// Labels stored on the container object.
    pub labels: BTreeMap<String, String>,
    /// Snapshotter for the writable snapshot.
    pub snapshotter: String,
    /// Key of the new writable snapshot.
    pub snapshot_key: String,
    /// Unpacked image the snapshot is prepared from.
    pub image: &'a ImageHandle,
}

/// Reference to a container object owned by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    /// Container ID.
    pub id: String,
    /// Image reference the container was created from.
    pub image: String,
    /// Labels stored on the container.
    pub labels: BTreeMap<String, String>,
}

/// Reference to a task owned by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    /// Owning container ID.
    pub container_id: String,
    /// Init process ID, if the runtime reports one.
    pub pid: Option<u32>,
}

// =============================================================================
// Traits
// =============================================================================

/// Opens sessions against a runtime.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establishes a session.
    async fn connect(&self, opts: &ConnectOptions) -> RuntimeResult<Box<dyn RuntimeClient>>;
}

/// A session with a runtime.
///
/// Every operation is a suspension point and may fail with a
/// [`RuntimeError`] carrying the underlying cause. None is retried.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Resolves and downloads an image.
    async fn fetch_image(&self, ctx: &Context, reference: &str) -> RuntimeResult<ImageHandle>;

    /// Materialises image layers onto a snapshotter.
    ///
    /// Safe to retry: an already unpacked image is left as is.
    async fn unpack(
        &self,
        ctx: &Context,
        image: &mut ImageHandle,
        snapshotter: &str,
    ) -> RuntimeResult<()>;

    /// Creates the container object and its writable snapshot.
    ///
    /// An ID already present in the namespace is rejected, never replaced.
    async fn create_container(
        &self,
        ctx: &Context,
        request: NewContainer<'_>,
    ) -> RuntimeResult<ContainerHandle>;

    /// Creates the task (process wrapper) for a container.
    async fn create_task(
        &self,
        ctx: &Context,
        container: &ContainerHandle,
        io: IoConfig,
    ) -> RuntimeResult<TaskHandle>;

    /// Starts a created task.
    async fn start_task(&self, ctx: &Context, task: &TaskHandle) -> RuntimeResult<()>;

    /// Releases the session.
    async fn close(&self) -> RuntimeResult<()>;
}
