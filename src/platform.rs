//! Platform detection and capability enumeration.
//!
//! Detects OS, architecture, and the kernel security features the security
//! presets depend on. The OS/arch pair selects the manifest of multi-arch
//! images; the architecture selects the seccomp architecture list.

use std::collections::HashSet;
use std::path::Path;

/// Detected platform information.
#[derive(Debug, Clone)]
pub struct Platform {
    /// Operating system.
    pub os: Os,
    /// CPU architecture.
    pub arch: Arch,
    /// Available capabilities.
    pub capabilities: HashSet<Capability>,
}

/// Operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Linux,
    Darwin,
    Windows,
    Unknown,
}

impl Os {
    /// Returns the OS this binary was built for.
    pub const fn current() -> Self {
        if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(target_os = "macos") {
            Self::Darwin
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Unknown
        }
    }

    /// OCI platform OS name.
    pub fn oci_name(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Darwin => "darwin",
            Self::Windows => "windows",
            Self::Unknown => "unknown",
        }
    }
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    Amd64,
    Arm64,
    Arm,
    Unknown,
}

impl Arch {
    /// Returns the architecture this binary was built for.
    pub const fn current() -> Self {
        if cfg!(target_arch = "x86_64") {
            Self::Amd64
        } else if cfg!(target_arch = "aarch64") {
            Self::Arm64
        } else if cfg!(target_arch = "arm") {
            Self::Arm
        } else {
            Self::Unknown
        }
    }

    /// OCI platform architecture name.
    pub fn oci_name(&self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
            Self::Arm => "arm",
            Self::Unknown => "unknown",
        }
    }
}

/// Kernel features that affect how a container is confined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Linux namespaces (pid, net, mnt, etc.)
    Namespaces,
    /// Seccomp syscall filtering
    Seccomp,
    /// AppArmor mandatory access control
    AppArmor,
}

impl Platform {
    /// Detects the current platform and its capabilities.
    pub fn detect() -> Self {
        let os = Os::current();
        Self {
            os,
            arch: Arch::current(),
            capabilities: Self::detect_capabilities(os),
        }
    }

    /// Returns the host OS and architecture with the given capabilities.
    pub fn with_capabilities(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        Self {
            os: Os::current(),
            arch: Arch::current(),
            capabilities: capabilities.into_iter().collect(),
        }
    }

    fn detect_capabilities(os: Os) -> HashSet<Capability> {
        let mut caps = HashSet::new();

        if os != Os::Linux {
            return caps;
        }

        if Path::new("/proc/self/ns/pid").exists() {
            caps.insert(Capability::Namespaces);
        }
        if Path::new("/proc/sys/kernel/seccomp").exists()
            || std::fs::read_to_string("/proc/self/status")
                .is_ok_and(|status| status.lines().any(|l| l.starts_with("Seccomp:")))
        {
            caps.insert(Capability::Seccomp);
        }
        if std::fs::read_to_string("/sys/module/apparmor/parameters/enabled")
            .is_ok_and(|v| v.trim() == "Y")
        {
            caps.insert(Capability::AppArmor);
        }

        caps
    }

    /// Returns true if the capability was detected.
    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Returns the OCI platform string (e.g., "linux/amd64").
    pub fn oci_platform(&self) -> String {
        format!("{}/{}", self.os.oci_name(), self.arch.oci_name())
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (capabilities: {:?})",
            self.oci_platform(),
            self.capabilities
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_detection() {
        let platform = Platform::detect();
        assert_eq!(platform.os, Os::current());
        assert_eq!(platform.arch, Arch::current());
        if platform.os != Os::Linux {
            assert!(platform.capabilities.is_empty());
        }
    }

    #[test]
    fn test_oci_platform_string() {
        let platform = Platform {
            os: Os::Linux,
            arch: Arch::Arm64,
            capabilities: HashSet::new(),
        };
        assert_eq!(platform.oci_platform(), "linux/arm64");
    }
}
