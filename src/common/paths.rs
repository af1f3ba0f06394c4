//! Configuration and control socket paths
//!
//! Control sockets live in a private per-run directory under
//! `$XDG_RUNTIME_DIR` (or the system temp dir), one pair per test unit, so
//! nothing is shared between units or between concurrent harness runs.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Name used for config and run directories
const APP_NAME: &str = "kvm-dmesg-ci";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/kvm-dmesg-ci/`
/// - macOS: `~/Library/Application Support/kvm-dmesg-ci/`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Base directory for run directories
pub fn runtime_base() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .filter(|dir| dir.is_dir())
        .unwrap_or_else(std::env::temp_dir)
}

/// Socket pair handed to one hypervisor instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlSockets {
    /// Structured control channel, used by kvm-dmesg
    pub qmp: PathBuf,
    /// Line-oriented monitor, used for `quit`
    pub monitor: PathBuf,
}

impl ControlSockets {
    /// Socket paths for the unit at `index` inside `dir`
    ///
    /// Names are index based; unit names can be long and Unix socket paths
    /// are limited to ~108 bytes.
    pub fn in_dir(dir: &Path, index: usize) -> Self {
        Self {
            qmp: dir.join(format!("{}-qmp.sock", index)),
            monitor: dir.join(format!("{}-mon.sock", index)),
        }
    }

    /// Remove leftover socket files
    pub fn remove(&self) {
        for path in [&self.qmp, &self.monitor] {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::debug!("Could not remove {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// Private directory owning all sockets of one harness run
///
/// The directory (mode 0700) is deleted when this value is dropped.
#[derive(Debug)]
pub struct RunDir {
    dir: TempDir,
}

impl RunDir {
    /// Create a run directory under [`runtime_base`]
    pub fn create() -> io::Result<Self> {
        Self::create_in(&runtime_base())
    }

    /// Create a run directory under `base`
    pub fn create_in(base: &Path) -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", APP_NAME))
            .tempdir_in(base)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o700))?;
        }

        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Allocate the socket pair for the unit at `index`
    pub fn sockets(&self, index: usize) -> ControlSockets {
        ControlSockets::in_dir(self.dir.path(), index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_dir_is_valid() {
        let dir = config_dir();
        assert!(dir.is_some());
    }

    #[test]
    fn test_sockets_are_unique_per_unit() {
        let base = tempfile::tempdir().unwrap();
        let run = RunDir::create_in(base.path()).unwrap();
        let a = run.sockets(0);
        let b = run.sockets(1);
        assert_ne!(a.qmp, b.qmp);
        assert_ne!(a.monitor, b.monitor);
        assert_ne!(a.qmp, a.monitor);
        assert!(a.qmp.starts_with(run.path()));
    }

    #[test]
    fn test_run_dirs_do_not_collide() {
        let base = tempfile::tempdir().unwrap();
        let first = RunDir::create_in(base.path()).unwrap();
        let second = RunDir::create_in(base.path()).unwrap();
        assert_ne!(first.sockets(0).qmp, second.sockets(0).qmp);
    }

    #[test]
    fn test_run_dir_removed_on_drop() {
        let base = tempfile::tempdir().unwrap();
        let run = RunDir::create_in(base.path()).unwrap();
        let path = run.path().to_path_buf();
        assert!(path.is_dir());
        drop(run);
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_tolerates_missing_files() {
        let base = tempfile::tempdir().unwrap();
        let sockets = ControlSockets::in_dir(base.path(), 3);
        std::fs::write(&sockets.qmp, "").unwrap();
        sockets.remove();
        assert!(!sockets.qmp.exists());
    }
}
