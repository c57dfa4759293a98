//! AppArmor profile resolution.
//!
//! Specs name an AppArmor profile; the kernel must have it loaded before the
//! engine can start a process under it. A missing profile is generated from
//! the default template, written under the state root, and loaded with
//! `apparmor_parser`. Hosts without AppArmor skip resolution entirely and
//! the engine ignores the profile name.

use crate::error::{RuntimeError, RuntimeResult};
use crate::platform::{Capability, Platform};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Kernel list of loaded profiles.
pub const PROFILES_FILE: &str = "/sys/kernel/security/apparmor/profiles";

/// Parser used to load generated profiles.
pub const PARSER_BINARY: &str = "apparmor_parser";

/// What has to happen before a profile can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileAction {
    /// AppArmor is disabled on the host; nothing to do.
    Unsupported,
    /// The kernel already has the profile.
    AlreadyLoaded,
    /// The profile must be generated and loaded.
    Load,
}

/// Decides how to make `name` available given the host state.
pub fn resolve(enabled: bool, loaded_profiles: &str, name: &str) -> ProfileAction {
    if !enabled {
        ProfileAction::Unsupported
    } else if is_loaded(loaded_profiles, name) {
        ProfileAction::AlreadyLoaded
    } else {
        ProfileAction::Load
    }
}

/// Checks a profiles listing (`<name> (<mode>)` per line) for `name`.
pub fn is_loaded(loaded_profiles: &str, name: &str) -> bool {
    loaded_profiles.lines().any(|line| {
        let profile = line.rsplit_once(" (").map_or(line, |(p, _)| p);
        profile.trim() == name
    })
}

/// Renders the default container profile under `name`.
pub fn default_profile(name: &str) -> String {
    format!(
        r#"#include <tunables/global>

profile {name} flags=(attach_disconnected,mediate_deleted) {{
  #include <abstractions/base>

  network,
  capability,
  file,
  umount,
  signal (receive) peer=unconfined,
  signal (send,receive) peer={name},

  deny @{{PROC}}/* w,
  deny @{{PROC}}/{{[^1-9],[^1-9][^0-9],[^1-9s][^0-9y][^0-9s],[^1-9][^0-9][^0-9][^0-9]*}}/** w,
  deny @{{PROC}}/sys/[^k]** w,
  deny @{{PROC}}/sys/kernel/{{?,??,[^s][^h][^m]**}} w,
  deny @{{PROC}}/sysrq-trigger rwklx,
  deny @{{PROC}}/kcore rwklx,

  deny mount,

  deny /sys/[^f]*/** wklx,
  deny /sys/f[^s]*/** wklx,
  deny /sys/fs/[^c]*/** wklx,
  deny /sys/fs/c[^g]*/** wklx,
  deny /sys/fs/cg[^r]*/** wklx,
  deny /sys/firmware/** rwklx,
  deny /sys/kernel/security/** rwklx,

  ptrace (trace,read,tracedby,readby) peer={name},
}}
"#
    )
}

/// Host AppArmor state and the tools to change it.
#[derive(Debug, Clone)]
pub struct AppArmor {
    enabled: bool,
    profiles_file: PathBuf,
    parser: PathBuf,
    profile_dir: PathBuf,
}

impl AppArmor {
    /// Uses the host kernel interface; generated profiles go in `profile_dir`.
    pub fn host(platform: &Platform, profile_dir: impl Into<PathBuf>) -> Self {
        Self::with_paths(
            platform.has(Capability::AppArmor),
            PROFILES_FILE,
            PARSER_BINARY,
            profile_dir,
        )
    }

    /// Uses explicit paths for the profile listing and parser.
    pub fn with_paths(
        enabled: bool,
        profiles_file: impl Into<PathBuf>,
        parser: impl Into<PathBuf>,
        profile_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            enabled,
            profiles_file: profiles_file.into(),
            parser: parser.into(),
            profile_dir: profile_dir.into(),
        }
    }

    /// Returns true if the host enforces AppArmor.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Makes sure `name` is loaded, loading the default profile if needed.
    pub async fn ensure_loaded(&self, name: &str) -> RuntimeResult<ProfileAction> {
        let failed = |reason: String| RuntimeError::SecurityProfileFailed {
            profile: name.to_string(),
            reason,
        };

        let loaded = if self.enabled {
            fs::read_to_string(&self.profiles_file).map_err(|e| {
                failed(format!("cannot read {}: {}", self.profiles_file.display(), e))
            })?
        } else {
            String::new()
        };

        let action = resolve(self.enabled, &loaded, name);
        match action {
            ProfileAction::Unsupported => {
                debug!("AppArmor disabled; not loading profile {}", name);
            }
            ProfileAction::AlreadyLoaded => {
                debug!("AppArmor profile {} already loaded", name);
            }
            ProfileAction::Load => {
                let path = self.write_profile(name).map_err(|e| failed(e.to_string()))?;
                self.load(&path).await.map_err(failed)?;
                info!("Loaded AppArmor profile {} from {}", name, path.display());
            }
        }
        Ok(action)
    }

    fn write_profile(&self, name: &str) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.profile_dir)?;
        let path = self.profile_dir.join(name);
        fs::write(&path, default_profile(name))?;
        Ok(path)
    }

    async fn load(&self, path: &Path) -> Result<(), String> {
        let mut cmd = Command::new(&self.parser);
        cmd.arg("-Kr")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let output = cmd
            .output()
            .await
            .map_err(|e| format!("failed to spawn {}: {}", self.parser.display(), e))?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(format!(
            "{} exited with {}: {}",
            self.parser.display(),
            output.status,
            stderr.trim()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "docker-default (enforce)\n/usr/sbin/cupsd (enforce)\nboss (complain)\n";

    #[test]
    fn test_is_loaded_matches_whole_name() {
        assert!(is_loaded(LISTING, "boss"));
        assert!(is_loaded(LISTING, "/usr/sbin/cupsd"));
        assert!(!is_loaded(LISTING, "docker"));
        assert!(!is_loaded("", "boss"));
    }

    #[test]
    fn test_resolve() {
        assert_eq!(resolve(false, LISTING, "boss"), ProfileAction::Unsupported);
        assert_eq!(resolve(true, LISTING, "boss"), ProfileAction::AlreadyLoaded);
        assert_eq!(resolve(true, "docker-default (enforce)\n", "boss"), ProfileAction::Load);
    }

    #[test]
    fn test_default_profile_names_itself() {
        let profile = default_profile("boss");
        assert!(profile.starts_with("#include <tunables/global>"));
        assert!(profile.contains("profile boss flags=(attach_disconnected,mediate_deleted) {"));
        assert!(profile.contains("peer=boss,"));
        assert!(profile.contains("deny @{PROC}/sysrq-trigger rwklx,"));
        assert!(profile.trim_end().ends_with('}'));
    }

    #[tokio::test]
    async fn test_disabled_host_never_reads_kernel() {
        let apparmor = AppArmor::with_paths(false, "/nonexistent", "/nonexistent", "/nonexistent");
        assert_eq!(
            apparmor.ensure_loaded("boss").await.unwrap(),
            ProfileAction::Unsupported
        );
    }
}
