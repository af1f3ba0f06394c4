//! QEMU lookup and command line assembly

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::common::config::HypervisorConfig;
use crate::common::paths::ControlSockets;
use crate::common::{Error, Result};

/// Find the hypervisor executable
///
/// Order: explicit `path` from config, then each well-known location, then a
/// PATH lookup of each fallback name.
pub fn locate(config: &HypervisorConfig) -> Result<PathBuf> {
    if let Some(path) = &config.path {
        if path.exists() {
            return Ok(path.clone());
        }
        return Err(Error::hypervisor_not_found(&[path.display().to_string()]));
    }

    if let Some(path) = config.search_paths.iter().find(|p| p.exists()) {
        return Ok(path.clone());
    }

    for name in &config.fallback_names {
        if let Ok(path) = which::which(name) {
            return Ok(path);
        }
    }

    let searched: Vec<String> = config
        .search_paths
        .iter()
        .map(|p| p.display().to_string())
        .chain(config.fallback_names.iter().map(|n| format!("{} (PATH)", n)))
        .collect();
    Err(Error::hypervisor_not_found(searched.as_slice()))
}

/// Whether hardware acceleration can be requested
pub fn acceleration_available(config: &HypervisorConfig) -> bool {
    config.accel_device.exists()
}

/// Everything needed to start one VM
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub kernel: PathBuf,
    pub sockets: ControlSockets,
    pub memory: String,
    pub smp: u32,
    pub append: String,
    pub accelerate: bool,
    pub extra_args: Vec<String>,
}

impl LaunchSpec {
    pub fn new(
        program: PathBuf,
        kernel: &Path,
        sockets: &ControlSockets,
        config: &HypervisorConfig,
    ) -> Self {
        Self {
            program,
            kernel: kernel.to_path_buf(),
            sockets: sockets.clone(),
            memory: config.memory.clone(),
            smp: config.smp,
            append: config.append.clone(),
            accelerate: acceleration_available(config),
            extra_args: config.extra_args.clone(),
        }
    }

    /// Hypervisor arguments, serial console on stdout
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-kernel".into(),
            self.kernel.clone().into(),
            "-nographic".into(),
            "-no-reboot".into(),
            "-append".into(),
            self.append.clone().into(),
            "-m".into(),
            self.memory.clone().into(),
            "-smp".into(),
            self.smp.to_string().into(),
            "-qmp".into(),
            socket_arg(&self.sockets.qmp),
            "-monitor".into(),
            socket_arg(&self.sockets.monitor),
        ];

        if self.accelerate {
            args.extend(["-accel", "kvm", "-cpu", "host"].map(OsString::from));
        }

        args.extend(self.extra_args.iter().map(OsString::from));
        args
    }

    /// Printable command line
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_os_str().to_owned())
            .chain(self.args())
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// `unix:<path>,server,nowait`
fn socket_arg(path: &Path) -> OsString {
    let mut arg = OsString::from("unix:");
    arg.push(path.as_os_str());
    arg.push(",server,nowait");
    arg
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn no_accel_config() -> HypervisorConfig {
        HypervisorConfig {
            accel_device: PathBuf::from("/nonexistent/kvm"),
            ..HypervisorConfig::default()
        }
    }

    #[test]
    fn test_args_without_acceleration() {
        let sockets = ControlSockets {
            qmp: PathBuf::from("/run/ci/0-qmp.sock"),
            monitor: PathBuf::from("/run/ci/0-mon.sock"),
        };
        let spec = LaunchSpec::new(
            PathBuf::from("/usr/bin/qemu-system-x86_64"),
            Path::new("/k/vmlinuz-5.10"),
            &sockets,
            &no_accel_config(),
        );
        let args: Vec<String> = spec
            .args()
            .into_iter()
            .map(|a| a.into_string().unwrap())
            .collect();
        assert_eq!(
            args,
            vec![
                "-kernel",
                "/k/vmlinuz-5.10",
                "-nographic",
                "-no-reboot",
                "-append",
                "console=ttyS0",
                "-m",
                "1G",
                "-smp",
                "1",
                "-qmp",
                "unix:/run/ci/0-qmp.sock,server,nowait",
                "-monitor",
                "unix:/run/ci/0-mon.sock,server,nowait",
            ]
        );
    }

    #[test]
    fn test_acceleration_flags_when_device_present() {
        let dir = tempdir().unwrap();
        let device = dir.path().join("kvm");
        std::fs::write(&device, b"").unwrap();
        let config = HypervisorConfig {
            accel_device: device,
            ..HypervisorConfig::default()
        };
        let sockets = ControlSockets::in_dir(dir.path(), 0);
        let spec =
            LaunchSpec::new(PathBuf::from("qemu"), Path::new("/k/vmlinuz"), &sockets, &config);
        let display = spec.display();
        assert!(display.ends_with("-accel kvm -cpu host"), "{}", display);
        assert!(display.starts_with("qemu -kernel /k/vmlinuz"));
    }

    #[test]
    fn test_locate_prefers_search_paths_in_order() {
        let dir = tempdir().unwrap();
        let second = dir.path().join("qemu-b");
        std::fs::write(&second, b"").unwrap();
        let config = HypervisorConfig {
            search_paths: vec![dir.path().join("qemu-a"), second.clone()],
            fallback_names: vec![],
            ..HypervisorConfig::default()
        };
        assert_eq!(locate(&config).unwrap(), second);
    }

    #[test]
    fn test_locate_not_found_lists_everything_searched() {
        let config = HypervisorConfig {
            search_paths: vec![PathBuf::from("/nonexistent/qemu")],
            fallback_names: vec!["bootci-no-such-qemu".to_string()],
            ..HypervisorConfig::default()
        };
        match locate(&config) {
            Err(Error::HypervisorNotFound { searched }) => {
                assert!(searched.contains("/nonexistent/qemu"));
                assert!(searched.contains("bootci-no-such-qemu (PATH)"));
            }
            other => panic!("Expected HypervisorNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_locate_explicit_path() {
        let dir = tempdir().unwrap();
        let qemu = dir.path().join("my-qemu");
        std::fs::write(&qemu, b"").unwrap();
        let config = HypervisorConfig {
            path: Some(qemu.clone()),
            ..HypervisorConfig::default()
        };
        assert_eq!(locate(&config).unwrap(), qemu);

        let missing = HypervisorConfig {
            path: Some(dir.path().join("gone")),
            ..HypervisorConfig::default()
        };
        assert!(matches!(locate(&missing), Err(Error::HypervisorNotFound { .. })));
    }
}
