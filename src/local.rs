//! # Local Runtime Backend
//!
//! A [`RuntimeClient`] that keeps all runtime state in a directory (the
//! connect address) and drives an OCI runtime binary for tasks.
//!
//! ## State Layout
//!
//! ```text
//! <address>/
//! ├── content/                      content store (BlobStore)
//! ├── snapshots/native/<digest>/    committed image snapshots
//! └── <namespace>/
//!     ├── <engine>/                 engine state (--root)
//!     └── containers/<id>/
//!         ├── rootfs/               writable snapshot
//!         ├── config.json           OCI runtime spec
//!         ├── container.json        container record (labels, image, ...)
//!         ├── engine.log            engine log (JSON lines)
//!         └── init.pid              task init PID
//! ```
//!
//! ## Engines
//!
//! The default runtime name selects the engine binary:
//!
//! | Runtime | Binary |
//! |---------|--------|
//! | `io.containerd.runc.v1` | `runc` |
//! | `io.containerd.crun.v2` | `crun` |
//! | `youki` | `youki` |
//! | `/usr/local/bin/runc` | that path |
//!
//! Bare names are searched on `PATH` at connect time.
//!
//! ## Task Lifecycle
//!
//! ```text
//! create_task: <engine> create --bundle <dir> --pid-file <dir>/init.pid <id>
//! start_task:  <engine> start <id>
//! ```
//!
//! Engine stdio is always `/dev/null`; the container's init inherits it, so
//! nothing stays attached after the launcher exits. Failures are reported
//! from the last message in `engine.log`.
//!
//! ## Security Presets
//!
//! Before a container is created, every AppArmor profile its spec names is
//! loaded if the host enforces AppArmor and lacks it (generated profiles live
//! in `<address>/apparmor/`). A seccomp preset on a host without seccomp
//! fails the create.

use crate::apparmor::AppArmor;
use crate::client::{
    ConnectOptions, Connector, ContainerHandle, Context, ImageHandle, IoConfig, NewContainer,
    RuntimeClient, TaskHandle,
};
use crate::constants::{CONTAINERS_DIR, validate_container_id};
use crate::error::{RuntimeError, RuntimeResult};
use crate::opts::{SpecOpt, build_spec};
use crate::platform::{Capability, Platform};
use crate::registry::{ImageFetcher, RegistryFetcher};
use crate::snapshot::Snapshotter;
use crate::storage::BlobStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::Command;
use tracing::{debug, info, warn};

const ROOTFS_DIR: &str = "rootfs";
const SPEC_FILE: &str = "config.json";
const RECORD_FILE: &str = "container.json";
const ENGINE_LOG_FILE: &str = "engine.log";
const PID_FILE: &str = "init.pid";
const APPARMOR_DIR: &str = "apparmor";

// =============================================================================
// Connector
// =============================================================================

/// Opens sessions against a local state root.
pub struct LocalConnector {
    fetcher: Arc<dyn ImageFetcher>,
    engine_binary: Option<PathBuf>,
    platform: Option<Platform>,
    apparmor: Option<AppArmor>,
}

impl LocalConnector {
    /// Creates a connector that pulls from OCI registries.
    pub fn new() -> Self {
        Self::with_fetcher(Arc::new(RegistryFetcher::new()))
    }

    /// Creates a connector with a custom image source.
    pub fn with_fetcher(fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self {
            fetcher,
            engine_binary: None,
            platform: None,
            apparmor: None,
        }
    }

    /// Uses a specific engine binary instead of resolving the runtime name.
    pub fn with_engine_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.engine_binary = Some(path.into());
        self
    }

    /// Uses the given platform instead of probing the host.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Uses the given AppArmor interface instead of the host kernel's.
    pub fn with_apparmor(mut self, apparmor: AppArmor) -> Self {
        self.apparmor = Some(apparmor);
        self
    }
}

impl Default for LocalConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for LocalConnector {
    async fn connect(&self, opts: &ConnectOptions) -> RuntimeResult<Box<dyn RuntimeClient>> {
        let connect_failed = |reason: String| RuntimeError::ConnectFailed {
            address: opts.address.clone(),
            reason,
        };

        if opts.address.is_empty() {
            return Err(connect_failed("address is empty".to_string()));
        }

        let root = PathBuf::from(&opts.address);
        fs::create_dir_all(&root).map_err(|e| connect_failed(e.to_string()))?;
        let store = BlobStore::open(&root).map_err(|e| connect_failed(e.to_string()))?;

        let binary = match &self.engine_binary {
            Some(path) => check_engine(&opts.default_runtime, path.clone())?,
            None => resolve_engine(&opts.default_runtime)?,
        };
        let engine = Engine {
            name: engine_name(&binary),
            binary,
        };

        let platform = self.platform.clone().unwrap_or_else(Platform::detect);
        let apparmor = self
            .apparmor
            .clone()
            .unwrap_or_else(|| AppArmor::host(&platform, root.join(APPARMOR_DIR)));
        if !platform.has(Capability::Namespaces) {
            warn!("Platform {} lacks namespace support", platform);
        }
        info!(
            "Local runtime at {} using {} ({})",
            root.display(),
            engine.binary.display(),
            platform
        );

        Ok(Box::new(LocalClient {
            root,
            store,
            fetcher: Arc::clone(&self.fetcher),
            engine,
            platform,
            apparmor,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Maps a runtime name to the engine binary it runs.
///
/// `io.containerd.<name>.<version>` selects `<name>`. Anything else is
/// taken as a binary name or path.
pub fn engine_binary_name(runtime: &str) -> RuntimeResult<String> {
    let unavailable = |reason: &str| RuntimeError::EngineUnavailable {
        engine: runtime.to_string(),
        reason: reason.to_string(),
    };

    if runtime.is_empty() {
        return Err(unavailable("runtime name is empty"));
    }

    match runtime.strip_prefix("io.containerd.") {
        Some(rest) => match rest.split('.').collect::<Vec<_>>().as_slice() {
            [name, version] if !name.is_empty() && version.starts_with('v') => {
                Ok(name.to_string())
            }
            _ => Err(unavailable(
                "expected io.containerd.<name>.<version> runtime name",
            )),
        },
        None => Ok(runtime.to_string()),
    }
}

fn resolve_engine(runtime: &str) -> RuntimeResult<PathBuf> {
    let name = engine_binary_name(runtime)?;
    if name.contains('/') {
        return check_engine(runtime, PathBuf::from(name));
    }

    std::env::var_os("PATH")
        .into_iter()
        .flat_map(|paths| std::env::split_paths(&paths).collect::<Vec<_>>())
        .map(|dir| dir.join(&name))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| RuntimeError::EngineUnavailable {
            engine: runtime.to_string(),
            reason: format!("'{}' not found on PATH", name),
        })
}

fn check_engine(runtime: &str, path: PathBuf) -> RuntimeResult<PathBuf> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(RuntimeError::EngineUnavailable {
            engine: runtime.to_string(),
            reason: format!("{} does not exist", path.display()),
        })
    }
}

fn engine_name(binary: &Path) -> String {
    binary
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "engine".to_string())
}

// =============================================================================
// Client
// =============================================================================

struct Engine {
    name: String,
    binary: PathBuf,
}

/// Persisted container object.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContainerRecord {
    id: String,
    image: String,
    image_digest: String,
    labels: BTreeMap<String, String>,
    snapshotter: String,
    snapshot_key: String,
    runtime: String,
    spec_opts: Vec<String>,
    created_at: DateTime<Utc>,
}

/// Session against a local state root.
pub struct LocalClient {
    root: PathBuf,
    store: BlobStore,
    fetcher: Arc<dyn ImageFetcher>,
    engine: Engine,
    platform: Platform,
    apparmor: AppArmor,
    closed: AtomicBool,
}

impl LocalClient {
    fn ensure_open(&self) -> RuntimeResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RuntimeError::SessionClosed);
        }
        Ok(())
    }

    fn namespace_dir(&self, ctx: &Context) -> RuntimeResult<PathBuf> {
        let namespace = ctx.namespace();
        validate_container_id(namespace).map_err(|reason| RuntimeError::InvalidNamespace {
            namespace: namespace.to_string(),
            reason: reason.to_string(),
        })?;
        Ok(self.root.join(namespace))
    }

    fn container_dir(&self, ctx: &Context, id: &str) -> RuntimeResult<PathBuf> {
        Ok(self.namespace_dir(ctx)?.join(CONTAINERS_DIR).join(id))
    }

    /// Makes the security presets named by the spec usable on this host.
    async fn prepare_security(&self, spec_opts: &[SpecOpt]) -> RuntimeResult<()> {
        for opt in spec_opts {
            match opt {
                SpecOpt::ApparmorProfile(name) => {
                    self.apparmor.ensure_loaded(name).await?;
                }
                SpecOpt::SeccompProfile(preset) if !self.platform.has(Capability::Seccomp) => {
                    return Err(RuntimeError::SecurityProfileFailed {
                        profile: format!("seccomp:{}", preset.name()),
                        reason: "host kernel lacks seccomp support".to_string(),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Builds an engine invocation with stdio detached.
    fn engine_command(&self, ns_dir: &Path, container_dir: &Path, io: IoConfig) -> Command {
        let mut cmd = Command::new(&self.engine.binary);
        cmd.arg("--root")
            .arg(ns_dir.join(&self.engine.name))
            .arg("--log")
            .arg(container_dir.join(ENGINE_LOG_FILE))
            .arg("--log-format")
            .arg("json");

        match io {
            IoConfig::Null => {
                cmd.stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null());
            }
        }

        cmd.kill_on_drop(true);
        cmd
    }

    /// Runs an engine command, returning a failure reason on error.
    async fn run_engine(&self, mut cmd: Command, container_dir: &Path) -> Result<(), String> {
        debug!("Engine command: {:?}", cmd.as_std());

        let status = cmd.status().await.map_err(|e| {
            format!(
                "failed to spawn {}: {}",
                self.engine.binary.display(),
                e
            )
        })?;

        if status.success() {
            return Ok(());
        }

        let detail = last_log_message(&container_dir.join(ENGINE_LOG_FILE))
            .unwrap_or_else(|| "no engine log output".to_string());
        Err(format!("{} exited with {}: {}", self.engine.name, status, detail))
    }

    fn write_bundle(
        &self,
        container_dir: &Path,
        request: &NewContainer<'_>,
    ) -> RuntimeResult<ContainerRecord> {
        let mut spec = build_spec(&request.id, &request.spec_opts);
        spec.root.path = ROOTFS_DIR.to_string();

        let spec_json = serde_json::to_vec_pretty(&spec)
            .map_err(|e| RuntimeError::Serialization(e.to_string()))?;
        fs::write(container_dir.join(SPEC_FILE), spec_json)?;

        let record = ContainerRecord {
            id: request.id.clone(),
            image: request.image.reference.clone(),
            image_digest: request.image.digest.clone(),
            labels: request.labels.clone(),
            snapshotter: request.snapshotter.clone(),
            snapshot_key: request.snapshot_key.clone(),
            runtime: self.engine.name.clone(),
            spec_opts: request.spec_opts.iter().map(|o| o.to_string()).collect(),
            created_at: Utc::now(),
        };
        let record_json = serde_json::to_vec_pretty(&record)
            .map_err(|e| RuntimeError::Serialization(e.to_string()))?;
        fs::write(container_dir.join(RECORD_FILE), record_json)?;

        Ok(record)
    }
}

#[async_trait]
impl RuntimeClient for LocalClient {
    async fn fetch_image(&self, _ctx: &Context, reference: &str) -> RuntimeResult<ImageHandle> {
        self.ensure_open()?;
        self.fetcher.fetch(reference, &self.store).await
    }

    async fn unpack(
        &self,
        _ctx: &Context,
        image: &mut ImageHandle,
        snapshotter: &str,
    ) -> RuntimeResult<()> {
        self.ensure_open()?;
        let target = Snapshotter::open(&self.root, snapshotter)?;

        let store = self.store.clone();
        let handle = image.clone();
        tokio::task::spawn_blocking(move || target.unpack(&handle, &store))
            .await
            .map_err(|e| RuntimeError::UnpackFailed {
                reference: image.reference.clone(),
                snapshotter: snapshotter.to_string(),
                reason: e.to_string(),
            })??;

        image.mark_unpacked(snapshotter);
        Ok(())
    }

    async fn create_container(
        &self,
        ctx: &Context,
        request: NewContainer<'_>,
    ) -> RuntimeResult<ContainerHandle> {
        self.ensure_open()?;

        validate_container_id(&request.id).map_err(|reason| RuntimeError::InvalidContainerId {
            id: request.id.clone(),
            reason: reason.to_string(),
        })?;

        if !request.image.is_unpacked(&request.snapshotter) {
            return Err(RuntimeError::NotUnpacked {
                reference: request.image.reference.clone(),
                snapshotter: request.snapshotter.clone(),
            });
        }
        let snapshotter = Snapshotter::open(&self.root, &request.snapshotter)?;
        self.prepare_security(&request.spec_opts).await?;

        let container_dir = self.container_dir(ctx, &request.id)?;
        if let Some(parent) = container_dir.parent() {
            fs::create_dir_all(parent)?;
        }
        match fs::create_dir(&container_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(RuntimeError::ContainerAlreadyExists(request.id.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        let rootfs = container_dir.join(ROOTFS_DIR);
        let image_digest = request.image.digest.clone();
        let prepared =
            tokio::task::spawn_blocking(move || snapshotter.prepare(&image_digest, &rootfs))
                .await
                .map_err(|e| RuntimeError::CreateFailed {
                    id: request.id.clone(),
                    reason: e.to_string(),
                })
                .and_then(|r| r);

        // A container that never fully existed must not block the ID.
        let record = match prepared.and_then(|()| self.write_bundle(&container_dir, &request)) {
            Ok(record) => record,
            Err(e) => {
                let _ = fs::remove_dir_all(&container_dir);
                return Err(RuntimeError::CreateFailed {
                    id: request.id.clone(),
                    reason: e.to_string(),
                });
            }
        };

        info!(
            "Created container {} from {} in namespace {}",
            record.id,
            record.image,
            ctx.namespace()
        );

        Ok(ContainerHandle {
            id: record.id,
            image: record.image,
            labels: record.labels,
        })
    }

    async fn create_task(
        &self,
        ctx: &Context,
        container: &ContainerHandle,
        io: IoConfig,
    ) -> RuntimeResult<TaskHandle> {
        self.ensure_open()?;

        let ns_dir = self.namespace_dir(ctx)?;
        let container_dir = self.container_dir(ctx, &container.id)?;
        if !container_dir.join(SPEC_FILE).is_file() {
            return Err(RuntimeError::TaskCreateFailed {
                id: container.id.clone(),
                reason: "container not found".to_string(),
            });
        }

        let pid_file = container_dir.join(PID_FILE);
        let mut cmd = self.engine_command(&ns_dir, &container_dir, io);
        cmd.arg("create")
            .arg("--bundle")
            .arg(&container_dir)
            .arg("--pid-file")
            .arg(&pid_file)
            .arg(&container.id);

        self.run_engine(cmd, &container_dir)
            .await
            .map_err(|reason| RuntimeError::TaskCreateFailed {
                id: container.id.clone(),
                reason,
            })?;

        let pid = fs::read_to_string(&pid_file)
            .ok()
            .and_then(|s| s.trim().parse().ok());
        info!("Created task for {} (pid {:?})", container.id, pid);

        Ok(TaskHandle {
            container_id: container.id.clone(),
            pid,
        })
    }

    async fn start_task(&self, ctx: &Context, task: &TaskHandle) -> RuntimeResult<()> {
        self.ensure_open()?;

        let ns_dir = self.namespace_dir(ctx)?;
        let container_dir = self.container_dir(ctx, &task.container_id)?;

        let mut cmd = self.engine_command(&ns_dir, &container_dir, IoConfig::Null);
        cmd.arg("start").arg(&task.container_id);

        self.run_engine(cmd, &container_dir)
            .await
            .map_err(|reason| RuntimeError::StartFailed {
                id: task.container_id.clone(),
                reason,
            })?;

        info!("Started task {}", task.container_id);
        Ok(())
    }

    async fn close(&self) -> RuntimeResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("Closed local runtime session at {}", self.root.display());
        }
        Ok(())
    }
}

/// Returns the last message from a JSON-lines engine log.
fn last_log_message(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let line = content.lines().rev().find(|l| !l.trim().is_empty())?;

    let message = serde_json::from_str::<serde_json::Value>(line)
        .ok()
        .and_then(|v| v.get("msg").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| line.trim().to_string());
    Some(message)
}
