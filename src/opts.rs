//! Spec options and the launch policy that chooses them.
//!
//! A [`SpecOpt`] is one directive over an in-progress [`Spec`]. Options are
//! applied in order and later options win on any field they both touch.
//!
//! [`build_spec_opts`] is the launch policy. Every container gets the same
//! five base options, in this order:
//!
//! ```text
//! image-config → host-localtime → no-new-privileges → apparmor → seccomp
//! ```
//!
//! Host networking appends `host-hosts → host-resolvconf →
//! host-namespace:network`. An isolated container gets nothing more and keeps
//! the private network namespace of the default spec.

use crate::client::{ImageConfig, ImageHandle};
use crate::config::{LaunchConfig, NetworkMode};
use crate::constants::{DEFAULT_APPARMOR_PROFILE, DEFAULT_PATH_ENV};
use crate::platform::Arch;
use crate::profiles::{self, SeccompPreset};
use crate::spec::{Mount, NamespaceKind, Spec};

/// A directive applied to an OCI spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecOpt {
    /// Process args, env, cwd and user from the image config.
    ImageConfig(ImageConfig),
    /// Bind the host's `/etc/localtime`.
    HostLocaltime,
    /// Set `no_new_privileges` on the process.
    NoNewPrivileges,
    /// Confine the process with a named AppArmor profile.
    ApparmorProfile(String),
    /// Install a seccomp preset.
    SeccompProfile(SeccompPreset),
    /// Bind the host's `/etc/hosts`.
    HostHostsFile,
    /// Bind the host's `/etc/resolv.conf`.
    HostResolvconf,
    /// Share a host namespace instead of creating one.
    HostNamespace(NamespaceKind),
}

impl SpecOpt {
    /// Applies the option to a spec.
    pub fn apply(&self, spec: &mut Spec) {
        match self {
            Self::ImageConfig(config) => apply_image_config(spec, config),
            Self::HostLocaltime => spec.set_mount(Mount::host_bind_ro("/etc/localtime")),
            Self::NoNewPrivileges => spec.process.no_new_privileges = true,
            Self::ApparmorProfile(name) => spec.process.apparmor_profile = Some(name.clone()),
            Self::SeccompProfile(preset) => {
                spec.linux_mut().seccomp = Some(profiles::seccomp(*preset, Arch::current()));
            }
            Self::HostHostsFile => spec.set_mount(Mount::host_bind_ro("/etc/hosts")),
            Self::HostResolvconf => spec.set_mount(Mount::host_bind_ro("/etc/resolv.conf")),
            Self::HostNamespace(kind) => spec.remove_namespace(*kind),
        }
    }
}

impl std::fmt::Display for SpecOpt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ImageConfig(_) => write!(f, "image-config"),
            Self::HostLocaltime => write!(f, "host-localtime"),
            Self::NoNewPrivileges => write!(f, "no-new-privileges"),
            Self::ApparmorProfile(name) => write!(f, "apparmor:{}", name),
            Self::SeccompProfile(preset) => write!(f, "seccomp:{}", preset.name()),
            Self::HostHostsFile => write!(f, "host-hosts"),
            Self::HostResolvconf => write!(f, "host-resolvconf"),
            Self::HostNamespace(kind) => write!(f, "host-namespace:{}", kind),
        }
    }
}

/// Chooses the spec options for a launch.
///
/// Pure and deterministic: equal inputs give equal, identically ordered
/// sequences.
pub fn build_spec_opts(config: &LaunchConfig, image: &ImageHandle) -> Vec<SpecOpt> {
    let mut opts = vec![
        SpecOpt::ImageConfig(image.config.clone()),
        SpecOpt::HostLocaltime,
        SpecOpt::NoNewPrivileges,
        SpecOpt::ApparmorProfile(DEFAULT_APPARMOR_PROFILE.to_string()),
        SpecOpt::SeccompProfile(SeccompPreset::Default),
    ];

    match config.network {
        NetworkMode::Host => opts.extend([
            SpecOpt::HostHostsFile,
            SpecOpt::HostResolvconf,
            SpecOpt::HostNamespace(NamespaceKind::Network),
        ]),
        NetworkMode::Isolated => {}
    }

    opts
}

/// Builds a container spec: the default Unix spec with `opts` folded in.
pub fn build_spec(id: &str, opts: &[SpecOpt]) -> Spec {
    opts.iter().fold(Spec::default_unix(id), |mut spec, opt| {
        opt.apply(&mut spec);
        spec
    })
}

fn apply_image_config(spec: &mut Spec, config: &ImageConfig) {
    spec.process.env = vec![DEFAULT_PATH_ENV.to_string()];
    for entry in &config.env {
        spec.set_env(entry);
    }

    let args: Vec<String> = config
        .entrypoint
        .iter()
        .chain(config.cmd.iter())
        .cloned()
        .collect();
    if !args.is_empty() {
        spec.process.args = args;
    }

    spec.process.cwd = config
        .working_dir
        .as_deref()
        .filter(|dir| !dir.is_empty())
        .unwrap_or("/")
        .to_string();

    // Named users need the rootfs' passwd file; they run as root here.
    let (uid, gid) = config
        .user
        .as_deref()
        .and_then(parse_numeric_user)
        .unwrap_or((0, 0));
    spec.process.user.uid = uid;
    spec.process.user.gid = gid;
}

/// Parses `uid` or `uid:gid`. A bare uid uses it for the gid as well.
fn parse_numeric_user(user: &str) -> Option<(u32, u32)> {
    match user.split_once(':') {
        Some((uid, gid)) => Some((uid.parse().ok()?, gid.parse().ok()?)),
        None => {
            let uid = user.parse().ok()?;
            Some((uid, uid))
        }
    }
}
