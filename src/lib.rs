//! # boss
//!
//! **Single-container launcher for OCI runtimes**
//!
//! Reads a small TOML file naming a container ID, an image, and a network
//! mode, then drives a runtime session to get that container running:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              boss                                   │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  LaunchConfig (TOML)                                                │
//! │        │                                                            │
//! │        ▼                                                            │
//! │  ┌─────────────────────────────────────────────────────────────┐    │
//! │  │                        Launcher                             │    │
//! │  │  connect → fetch → unpack → spec opts → create container    │    │
//! │  │          → create task → start task            (close)      │    │
//! │  └─────────────────────────────────────────────────────────────┘    │
//! │                              │                                      │
//! │  ┌───────────────────────────┼───────────────────────────────┐      │
//! │  │           RuntimeClient facade (Connector trait)          │      │
//! │  └───────────────────────────┼───────────────────────────────┘      │
//! ├──────────────────────────────┼──────────────────────────────────────┤
//! │                       LocalConnector                                │
//! │  ┌──────────────┐  ┌───────────────┐  ┌──────────────────────┐      │
//! │  │ RegistryFetch│  │ BlobStore     │  │ Snapshotter (native) │      │
//! │  │ OCI distrib. │  │ sha256 verify │  │ whiteouts, limits    │      │
//! │  └──────────────┘  └───────────────┘  └──────────────────────┘      │
//! │                 runc / crun: create → start                         │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Container Policy
//!
//! Every container is confined the same way: image process defaults, the
//! host's localtime, `no_new_privileges`, the `boss` AppArmor profile and the
//! default seccomp allowlist. `network.host = true` additionally shares the
//! host network namespace and bind-mounts the host's `/etc/hosts` and
//! `/etc/resolv.conf` read-only. See [`opts::build_spec_opts`].
//!
//! Created containers carry restart labels
//! (`io.containerd/restart.status=running`, `io.containerd/restart.logpath`)
//! for an external restart supervisor.
//!
//! # Failure Model
//!
//! Steps are strictly sequential and the first failure ends the launch. The
//! session is closed on every path once opened. Nothing already created in
//! the runtime is rolled back.
//!
//! # Example
//!
//! ```rust,ignore
//! use boss::{Context, LaunchOptions, Launcher, LocalConnector, StdoutReporter};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> boss::Result<()> {
//!     let launcher = Launcher::new(
//!         Arc::new(LocalConnector::new()),
//!         Arc::new(StdoutReporter),
//!         LaunchOptions::default(),
//!     );
//!     let ctx = Context::new("boss");
//!     launcher.launch_file(&ctx, "redis.toml").await?;
//!     Ok(())
//! }
//! ```

pub mod apparmor;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod launch;
pub mod local;
pub mod opts;
pub mod platform;
pub mod profiles;
pub mod registry;
pub mod snapshot;
pub mod spec;
pub mod storage;

// Re-exports
pub use client::{
    ConnectOptions, Connector, ContainerHandle, Context, ImageConfig, ImageHandle, IoConfig,
    LayerInfo, NewContainer, RuntimeClient, TaskHandle,
};
pub use config::{LaunchConfig, NetworkMode};
pub use error::{ConfigError, Error, Result, RuntimeError, RuntimeResult};
pub use launch::{
    LaunchOptions, LaunchState, Launched, Launcher, Progress, Reporter, StdoutReporter,
};
pub use local::{LocalClient, LocalConnector};
pub use opts::{SpecOpt, build_spec, build_spec_opts};
pub use platform::{Arch, Capability, Os, Platform};
pub use registry::{ImageFetcher, RegistryFetcher};
pub use spec::Spec;
pub use storage::BlobStore;
