//! Launch orchestration.
//!
//! Drives one launch through the runtime client, strictly in sequence:
//!
//! ```text
//! Start → ConfigLoaded → Connected → ImageFetched → ImageUnpacked
//!       → SpecBuilt → ContainerCreated → TaskCreated → TaskStarted
//! ```
//!
//! Any step may fail instead, which ends the launch. Once a session is open
//! it is closed on every exit path. Containers and tasks already created in
//! the runtime are left in place on failure: they belong to the runtime from
//! then on, and operators or a restart supervisor inspect them there.

use crate::client::{ConnectOptions, Connector, Context, IoConfig, NewContainer, RuntimeClient};
use crate::config::LaunchConfig;
use crate::constants::{
    DEFAULT_ADDRESS, DEFAULT_LOG_DIR, DEFAULT_NAMESPACE, DEFAULT_RUNTIME, DEFAULT_SNAPSHOTTER,
    RESTART_LOGPATH_LABEL, RESTART_STATUS_LABEL, RESTART_STATUS_RUNNING,
};
use crate::error::Result;
use crate::opts::build_spec_opts;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

// =============================================================================
// Options
// =============================================================================

/// Process-wide options for a launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Runtime namespace.
    pub namespace: String,
    /// Base directory for the restart log-path label.
    pub log_dir: PathBuf,
    /// Runtime address.
    pub address: String,
    /// Default execution engine.
    pub runtime: String,
    /// Snapshotter images are unpacked onto.
    pub snapshotter: String,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            address: DEFAULT_ADDRESS.to_string(),
            runtime: DEFAULT_RUNTIME.to_string(),
            snapshotter: DEFAULT_SNAPSHOTTER.to_string(),
        }
    }
}

// =============================================================================
// State and Progress
// =============================================================================

/// Steps of a launch, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LaunchState {
    Start,
    ConfigLoaded,
    Connected,
    ImageFetched,
    ImageUnpacked,
    SpecBuilt,
    ContainerCreated,
    TaskCreated,
    TaskStarted,
}

impl std::fmt::Display for LaunchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::ConfigLoaded => "config-loaded",
            Self::Connected => "connected",
            Self::ImageFetched => "image-fetched",
            Self::ImageUnpacked => "image-unpacked",
            Self::SpecBuilt => "spec-built",
            Self::ContainerCreated => "container-created",
            Self::TaskCreated => "task-created",
            Self::TaskStarted => "task-started",
        };
        f.write_str(name)
    }
}

/// User-visible progress of a launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// The image is about to be unpacked.
    Unpacking { snapshotter: String },
    /// The container object exists.
    ContainerCreated { id: String, log_path: PathBuf },
    /// The task is about to start.
    Starting { id: String },
    /// The task is running.
    Started { id: String },
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unpacking { snapshotter } => write!(f, "unpacking image into {}", snapshotter),
            Self::ContainerCreated { id, log_path } => write!(
                f,
                "created container {} with logpath {}",
                id,
                log_path.display()
            ),
            Self::Starting { .. } => write!(f, "starting container..."),
            Self::Started { id } => write!(f, "container {} started", id),
        }
    }
}

/// Receives launch progress.
pub trait Reporter: Send + Sync {
    fn report(&self, progress: &Progress);
}

/// Prints progress lines to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutReporter;

impl Reporter for StdoutReporter {
    fn report(&self, progress: &Progress) {
        println!("{}", progress);
    }
}

/// A successfully started container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launched {
    /// Container ID.
    pub id: String,
    /// Path recorded in the restart log-path label.
    pub log_path: PathBuf,
    /// Init process ID, if the runtime reported one.
    pub pid: Option<u32>,
}

// =============================================================================
// Restart Metadata
// =============================================================================

/// Log path recorded for a container: `<log_dir>/<id>`.
///
/// The ID is appended verbatim, even when it starts with a separator.
pub fn log_path(log_dir: &Path, id: &str) -> PathBuf {
    let mut path = OsString::from(log_dir.as_os_str());
    if path.as_encoded_bytes().last() != Some(&b'/') {
        path.push("/");
    }
    path.push(id);
    PathBuf::from(path)
}

/// Labels read by the restart supervisor.
pub fn restart_labels(log_path: &Path) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            RESTART_STATUS_LABEL.to_string(),
            RESTART_STATUS_RUNNING.to_string(),
        ),
        (
            RESTART_LOGPATH_LABEL.to_string(),
            log_path.to_string_lossy().into_owned(),
        ),
    ])
}

// =============================================================================
// Launcher
// =============================================================================

/// Runs launches against a runtime.
pub struct Launcher {
    connector: Arc<dyn Connector>,
    reporter: Arc<dyn Reporter>,
    options: LaunchOptions,
}

impl Launcher {
    /// Creates a launcher.
    pub fn new(
        connector: Arc<dyn Connector>,
        reporter: Arc<dyn Reporter>,
        options: LaunchOptions,
    ) -> Self {
        Self {
            connector,
            reporter,
            options,
        }
    }

    /// Returns the launch options.
    pub fn options(&self) -> &LaunchOptions {
        &self.options
    }

    /// Loads a launch file and launches it.
    pub async fn launch_file(&self, ctx: &Context, path: impl AsRef<Path>) -> Result<Launched> {
        let config = LaunchConfig::load(path)?;
        debug!(id = %config.id, image = %config.image, network = %config.network, "config loaded");
        self.launch(ctx, &config).await
    }

    /// Launches a container and starts its task.
    ///
    /// The session is closed before returning, whatever the outcome; a close
    /// error is logged and never reported. A failure after the container was
    /// created leaves it in the runtime.
    pub async fn launch(&self, ctx: &Context, config: &LaunchConfig) -> Result<Launched> {
        let connect = ConnectOptions::new(&self.options.address, &self.options.runtime);
        let client = ctx
            .run("connect", self.connector.connect(&connect))
            .await?;
        info!(
            address = %connect.address,
            namespace = %ctx.namespace(),
            runtime = %connect.default_runtime,
            "connected to runtime"
        );

        let mut state = LaunchState::Connected;
        let result = self
            .run_session(ctx, client.as_ref(), config, &mut state)
            .await;

        // A close error never changes the outcome.
        if let Err(close_err) = client.close().await {
            warn!(error = %close_err, "failed to close runtime session");
        }

        if let Err(e) = &result {
            warn!(id = %config.id, last_state = %state, error = %e, "launch failed");
        }
        result
    }

    async fn run_session(
        &self,
        ctx: &Context,
        client: &dyn RuntimeClient,
        config: &LaunchConfig,
        state: &mut LaunchState,
    ) -> Result<Launched> {
        let snapshotter = self.options.snapshotter.as_str();

        let mut image = ctx
            .run("fetch image", client.fetch_image(ctx, &config.image))
            .await?;
        *state = LaunchState::ImageFetched;
        debug!(reference = %image.reference, digest = %image.digest, "image fetched");

        self.progress(Progress::Unpacking {
            snapshotter: snapshotter.to_string(),
        });
        ctx.run("unpack", client.unpack(ctx, &mut image, snapshotter))
            .await?;
        *state = LaunchState::ImageUnpacked;

        let spec_opts = build_spec_opts(config, &image);
        *state = LaunchState::SpecBuilt;
        debug!(
            opts = ?spec_opts.iter().map(|o| o.to_string()).collect::<Vec<_>>(),
            "spec options built"
        );

        let log_path = log_path(&self.options.log_dir, &config.id);
        let request = NewContainer {
            id: config.id.clone(),
            spec_opts,
            labels: restart_labels(&log_path),
            snapshotter: snapshotter.to_string(),
            snapshot_key: config.id.clone(),
            image: &image,
        };
        let container = ctx
            .run("create container", client.create_container(ctx, request))
            .await?;
        *state = LaunchState::ContainerCreated;
        self.progress(Progress::ContainerCreated {
            id: container.id.clone(),
            log_path: log_path.clone(),
        });

        let task = ctx
            .run("create task", client.create_task(ctx, &container, IoConfig::Null))
            .await?;
        *state = LaunchState::TaskCreated;

        self.progress(Progress::Starting {
            id: container.id.clone(),
        });
        ctx.run("start task", client.start_task(ctx, &task)).await?;
        *state = LaunchState::TaskStarted;
        self.progress(Progress::Started {
            id: container.id.clone(),
        });

        Ok(Launched {
            id: container.id,
            log_path,
            pid: task.pid,
        })
    }

    fn progress(&self, progress: Progress) {
        info!("{}", progress);
        self.reporter.report(&progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_path() {
        assert_eq!(
            log_path(Path::new("/var/log/boss"), "c1"),
            PathBuf::from("/var/log/boss/c1")
        );
        assert_eq!(
            log_path(Path::new("/var/log/boss/"), "c1"),
            PathBuf::from("/var/log/boss/c1")
        );
        assert_eq!(
            log_path(Path::new("/logs dir"), "my app.v2"),
            PathBuf::from("/logs dir/my app.v2")
        );
        assert_eq!(
            log_path(Path::new("/var/log"), "/abs"),
            PathBuf::from("/var/log//abs")
        );
    }

    #[test]
    fn test_restart_labels() {
        let labels = restart_labels(Path::new("/var/log/boss/c1"));
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[RESTART_STATUS_LABEL], "running");
        assert_eq!(labels[RESTART_LOGPATH_LABEL], "/var/log/boss/c1");
    }

    #[test]
    fn test_progress_lines() {
        let lines: Vec<String> = [
            Progress::Unpacking {
                snapshotter: "native".to_string(),
            },
            Progress::ContainerCreated {
                id: "c1".to_string(),
                log_path: PathBuf::from("/var/log/boss/c1"),
            },
            Progress::Starting {
                id: "c1".to_string(),
            },
            Progress::Started {
                id: "c1".to_string(),
            },
        ]
        .iter()
        .map(|p| p.to_string())
        .collect();

        assert_eq!(
            lines,
            vec![
                "unpacking image into native",
                "created container c1 with logpath /var/log/boss/c1",
                "starting container...",
                "container c1 started",
            ]
        );
    }

    #[test]
    fn test_state_order() {
        assert!(LaunchState::Start < LaunchState::ConfigLoaded);
        assert!(LaunchState::ContainerCreated < LaunchState::TaskStarted);
        assert_eq!(LaunchState::TaskStarted.to_string(), "task-started");
    }
}
