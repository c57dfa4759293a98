//! Tests for platform detection module.
//!
//! Validates OS/arch detection and OCI platform string generation.

use boss::{Arch, Capability, Os, Platform};
use std::collections::HashSet;

#[test]
fn test_platform_detect_matches_build_target() {
    let platform = Platform::detect();
    assert_eq!(platform.os, Os::current());
    assert_eq!(platform.arch, Arch::current());

    #[cfg(target_os = "linux")]
    assert_eq!(platform.os, Os::Linux);

    #[cfg(target_arch = "x86_64")]
    assert_eq!(platform.arch, Arch::Amd64);

    #[cfg(target_arch = "aarch64")]
    assert_eq!(platform.arch, Arch::Arm64);
}

#[cfg(target_os = "linux")]
#[test]
fn test_linux_namespaces_detected() {
    assert!(Platform::detect().has(Capability::Namespaces));
}

#[test]
fn test_with_capabilities_uses_host_target() {
    let platform = Platform::with_capabilities([Capability::Seccomp]);
    assert_eq!(platform.os, Os::current());
    assert_eq!(platform.arch, Arch::current());
    assert!(platform.has(Capability::Seccomp));
    assert!(!platform.has(Capability::AppArmor));
}

#[test]
fn test_oci_platform_string() {
    let platform = Platform {
        os: Os::Linux,
        arch: Arch::Arm64,
        capabilities: HashSet::new(),
    };
    assert_eq!(platform.oci_platform(), "linux/arm64");
    assert!(platform.to_string().starts_with("linux/arm64"));
}

#[test]
fn test_capability_lookup() {
    let platform = Platform {
        os: Os::Linux,
        arch: Arch::Amd64,
        capabilities: HashSet::from([Capability::Namespaces, Capability::Seccomp]),
    };
    assert!(platform.has(Capability::Namespaces));
    assert!(platform.has(Capability::Seccomp));
    assert!(!platform.has(Capability::AppArmor));
}

#[test]
fn test_non_linux_has_no_capabilities() {
    let platform = Platform::detect();
    if platform.os != Os::Linux {
        assert!(platform.capabilities.is_empty());
    }
}
