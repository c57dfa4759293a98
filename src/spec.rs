//! OCI runtime specification document.
//!
//! Serde model of the `config.json` a runtime consumes, limited to the
//! fields the launcher sets. [`Spec::default_unix`] is the base every
//! container starts from before spec options are applied.
//!
//! Ref: https://github.com/opencontainers/runtime-spec/blob/main/config.md

use crate::constants::{DEFAULT_PATH_ENV, OCI_RUNTIME_SPEC_VERSION};
use serde::{Deserialize, Serialize};

/// Default capability set granted to the container process.
const DEFAULT_CAPABILITIES: &[&str] = &[
    "CAP_CHOWN",
    "CAP_DAC_OVERRIDE",
    "CAP_FSETID",
    "CAP_FOWNER",
    "CAP_MKNOD",
    "CAP_NET_RAW",
    "CAP_SETGID",
    "CAP_SETUID",
    "CAP_SETFCAP",
    "CAP_SETPCAP",
    "CAP_NET_BIND_SERVICE",
    "CAP_SYS_CHROOT",
    "CAP_KILL",
    "CAP_AUDIT_WRITE",
];

const MASKED_PATHS: &[&str] = &[
    "/proc/acpi",
    "/proc/asound",
    "/proc/kcore",
    "/proc/keys",
    "/proc/latency_stats",
    "/proc/timer_list",
    "/proc/timer_stats",
    "/proc/sched_debug",
    "/proc/scsi",
    "/sys/firmware",
];

const READONLY_PATHS: &[&str] = &[
    "/proc/bus",
    "/proc/fs",
    "/proc/irq",
    "/proc/sys",
    "/proc/sysrq-trigger",
];

/// OCI Runtime Spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spec {
    pub oci_version: String,
    pub root: Root,
    pub process: Process,
    pub hostname: String,
    pub mounts: Vec<Mount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linux: Option<Linux>,
}

/// OCI root filesystem config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Root {
    pub path: String,
    pub readonly: bool,
}

/// OCI process config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    pub terminal: bool,
    pub user: User,
    pub args: Vec<String>,
    pub env: Vec<String>,
    pub cwd: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rlimits: Vec<Rlimit>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub no_new_privileges: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apparmor_profile: Option<String>,
}

/// OCI user config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: u32,
    pub gid: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_gids: Vec<u32>,
}

/// Linux capability sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capabilities {
    pub bounding: Vec<String>,
    pub effective: Vec<String>,
    pub permitted: Vec<String>,
}

/// POSIX resource limit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rlimit {
    #[serde(rename = "type")]
    pub rlimit_type: String,
    pub hard: u64,
    pub soft: u64,
}

/// OCI mount config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mount {
    pub destination: String,
    #[serde(rename = "type")]
    pub mount_type: String,
    pub source: String,
    #[serde(default)]
    pub options: Vec<String>,
}

impl Mount {
    fn new(destination: &str, mount_type: &str, source: &str, options: &[&str]) -> Self {
        Self {
            destination: destination.to_string(),
            mount_type: mount_type.to_string(),
            source: source.to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
        }
    }

    /// Read-only bind mount of a host path at the same location.
    pub fn host_bind_ro(path: &str) -> Self {
        Self::new(path, "bind", path, &["rbind", "ro"])
    }
}

/// OCI Linux-specific config.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Linux {
    pub namespaces: Vec<Namespace>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub masked_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub readonly_paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seccomp: Option<Seccomp>,
}

/// Linux namespace kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceKind {
    Pid,
    Network,
    Ipc,
    Uts,
    Mount,
    User,
    Cgroup,
}

impl std::fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pid => "pid",
            Self::Network => "network",
            Self::Ipc => "ipc",
            Self::Uts => "uts",
            Self::Mount => "mount",
            Self::User => "user",
            Self::Cgroup => "cgroup",
        };
        f.write_str(name)
    }
}

/// OCI namespace config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Namespace {
    #[serde(rename = "type")]
    pub kind: NamespaceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Seccomp filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seccomp {
    pub default_action: String,
    #[serde(default)]
    pub architectures: Vec<String>,
    #[serde(default)]
    pub syscalls: Vec<SyscallRule>,
}

/// A seccomp rule matching syscalls by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyscallRule {
    pub names: Vec<String>,
    pub action: String,
    /// Errno returned by `SCMP_ACT_ERRNO` rules; the engine default is `EPERM`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errno_ret: Option<u32>,
}

impl Spec {
    /// Returns the default Unix spec for a container.
    ///
    /// Runs `/bin/sh` as root in `/` with fresh pid, ipc, uts, mount and
    /// network namespaces.
    pub fn default_unix(id: &str) -> Self {
        let caps: Vec<String> = DEFAULT_CAPABILITIES.iter().map(|c| c.to_string()).collect();

        Self {
            oci_version: OCI_RUNTIME_SPEC_VERSION.to_string(),
            root: Root {
                path: "rootfs".to_string(),
                readonly: false,
            },
            process: Process {
                terminal: false,
                user: User {
                    uid: 0,
                    gid: 0,
                    additional_gids: Vec::new(),
                },
                args: vec!["/bin/sh".to_string()],
                env: vec![DEFAULT_PATH_ENV.to_string()],
                cwd: "/".to_string(),
                capabilities: Some(Capabilities {
                    bounding: caps.clone(),
                    effective: caps.clone(),
                    permitted: caps,
                }),
                rlimits: vec![Rlimit {
                    rlimit_type: "RLIMIT_NOFILE".to_string(),
                    hard: 1024,
                    soft: 1024,
                }],
                no_new_privileges: false,
                apparmor_profile: None,
            },
            hostname: id.to_string(),
            mounts: default_mounts(),
            linux: Some(Linux {
                namespaces: [
                    NamespaceKind::Pid,
                    NamespaceKind::Ipc,
                    NamespaceKind::Uts,
                    NamespaceKind::Mount,
                    NamespaceKind::Network,
                ]
                .into_iter()
                .map(|kind| Namespace { kind, path: None })
                .collect(),
                masked_paths: MASKED_PATHS.iter().map(|p| p.to_string()).collect(),
                readonly_paths: READONLY_PATHS.iter().map(|p| p.to_string()).collect(),
                seccomp: None,
            }),
        }
    }

    /// Returns the Linux section, creating it if absent.
    pub fn linux_mut(&mut self) -> &mut Linux {
        self.linux.get_or_insert_with(Linux::default)
    }

    /// Adds a mount, replacing any mount at the same destination.
    pub fn set_mount(&mut self, mount: Mount) {
        match self
            .mounts
            .iter_mut()
            .find(|m| m.destination == mount.destination)
        {
            Some(existing) => *existing = mount,
            None => self.mounts.push(mount),
        }
    }

    /// Returns the mount at `destination`, if any.
    pub fn mount(&self, destination: &str) -> Option<&Mount> {
        self.mounts.iter().find(|m| m.destination == destination)
    }

    /// Returns true if the container gets its own namespace of this kind.
    pub fn has_namespace(&self, kind: NamespaceKind) -> bool {
        self.linux
            .as_ref()
            .is_some_and(|l| l.namespaces.iter().any(|ns| ns.kind == kind))
    }

    /// Drops the namespace so the container shares the host's.
    pub fn remove_namespace(&mut self, kind: NamespaceKind) {
        if let Some(linux) = &mut self.linux {
            linux.namespaces.retain(|ns| ns.kind != kind);
        }
    }

    /// Sets an environment variable, replacing an existing entry for the key.
    pub fn set_env(&mut self, entry: &str) {
        let key = entry.split_once('=').map_or(entry, |(k, _)| k);
        match self
            .process
            .env
            .iter_mut()
            .find(|e| e.split_once('=').map_or(e.as_str(), |(k, _)| k) == key)
        {
            Some(existing) => *existing = entry.to_string(),
            None => self.process.env.push(entry.to_string()),
        }
    }
}

fn default_mounts() -> Vec<Mount> {
    vec![
        Mount::new("/proc", "proc", "proc", &["nosuid", "noexec", "nodev"]),
        Mount::new(
            "/dev",
            "tmpfs",
            "tmpfs",
            &["nosuid", "strictatime", "mode=755", "size=65536k"],
        ),
        Mount::new(
            "/dev/pts",
            "devpts",
            "devpts",
            &["nosuid", "noexec", "newinstance", "ptmxmode=0666", "mode=0620", "gid=5"],
        ),
        Mount::new(
            "/dev/shm",
            "tmpfs",
            "shm",
            &["nosuid", "noexec", "nodev", "mode=1777", "size=65536k"],
        ),
        Mount::new("/dev/mqueue", "mqueue", "mqueue", &["nosuid", "noexec", "nodev"]),
        Mount::new("/sys", "sysfs", "sysfs", &["nosuid", "noexec", "nodev", "ro"]),
        Mount::new(
            "/sys/fs/cgroup",
            "cgroup",
            "cgroup",
            &["nosuid", "noexec", "nodev", "relatime", "ro"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_unix_spec() {
        let spec = Spec::default_unix("c1");
        assert_eq!(spec.hostname, "c1");
        assert_eq!(spec.root.path, "rootfs");
        assert_eq!(spec.process.args, vec!["/bin/sh"]);
        assert!(!spec.process.no_new_privileges);
        assert!(spec.has_namespace(NamespaceKind::Network));
        assert!(spec.has_namespace(NamespaceKind::Pid));
        assert!(spec.mount("/proc").is_some());
    }

    #[test]
    fn test_set_mount_replaces_by_destination() {
        let mut spec = Spec::default_unix("c1");
        let before = spec.mounts.len();
        spec.set_mount(Mount::host_bind_ro("/etc/hosts"));
        spec.set_mount(Mount::host_bind_ro("/etc/hosts"));
        assert_eq!(spec.mounts.len(), before + 1);
    }

    #[test]
    fn test_set_env_replaces_key() {
        let mut spec = Spec::default_unix("c1");
        spec.set_env("PATH=/bin");
        spec.set_env("FOO=1");
        assert_eq!(spec.process.env, vec!["PATH=/bin", "FOO=1"]);
    }

    #[test]
    fn test_serialization_field_names() {
        let mut spec = Spec::default_unix("c1");
        spec.process.no_new_privileges = true;
        let json = serde_json::to_value(&spec).unwrap();

        assert_eq!(json["ociVersion"], "1.0.2");
        assert_eq!(json["process"]["noNewPrivileges"], true);
        assert_eq!(json["linux"]["namespaces"][0]["type"], "pid");
        assert!(json["linux"]["maskedPaths"].is_array());
    }
}
