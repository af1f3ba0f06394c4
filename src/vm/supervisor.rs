//! Boot a kernel under QEMU and wait for it to announce itself
//!
//! The serial console is read through [`console::watch`]. On success the VM is
//! left running and handed back as a [`RunningVm`]; on failure it is stopped
//! before `boot` returns.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::BufReader;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::common::config::Config;
use crate::common::paths::ControlSockets;
use crate::common::process::{drain_lines, terminate, TERMINATE_GRACE};
use crate::common::{ArtifactKind, Error, Result};
use crate::console::{self, BootObservation, WatchSpec};

use super::hypervisor::{self, LaunchSpec};

/// Result of a boot attempt that got as far as spawning QEMU
#[derive(Debug)]
pub enum BootOutcome {
    /// Marker seen; the guest is still running
    Booted(RunningVm),
    /// No marker; the hypervisor has already been stopped
    Failed(BootObservation),
}

impl BootOutcome {
    pub fn is_booted(&self) -> bool {
        matches!(self, BootOutcome::Booted(_))
    }
}

/// How a running VM ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmExit {
    /// Exited on its own, usually after `quit`
    Exited(ExitStatus),
    /// Still running after the exit wait and had to be killed
    Killed,
}

/// A booted guest
///
/// Dropping this kills the hypervisor.
#[derive(Debug)]
pub struct RunningVm {
    child: Child,
    sockets: ControlSockets,
    observation: BootObservation,
    drains: Vec<JoinHandle<()>>,
}

impl RunningVm {
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn sockets(&self) -> &ControlSockets {
        &self.sockets
    }

    /// Console output up to and including the boot marker
    pub fn observation(&self) -> &BootObservation {
        &self.observation
    }

    /// Wait up to `wait` for the hypervisor to exit, kill it otherwise
    pub async fn reap(mut self, wait: Duration) -> VmExit {
        let exit = match tokio::time::timeout(wait, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!("Hypervisor exited with {}", status);
                VmExit::Exited(status)
            }
            Ok(Err(e)) => {
                tracing::warn!("Failed to wait for hypervisor: {}", e);
                terminate(&mut self.child, TERMINATE_GRACE).await;
                VmExit::Killed
            }
            Err(_) => {
                tracing::warn!(
                    pid = ?self.child.id(),
                    "Hypervisor still running {:?} after shutdown, killing it",
                    wait
                );
                terminate(&mut self.child, TERMINATE_GRACE).await;
                VmExit::Killed
            }
        };

        for drain in self.drains.drain(..) {
            drain.abort();
        }
        self.sockets.remove();
        exit
    }
}

/// Boot `kernel` and watch the console for the configured marker
///
/// Fails before spawning anything when the image is missing or no hypervisor
/// can be found.
pub async fn boot(kernel: &Path, sockets: &ControlSockets, config: &Config) -> Result<BootOutcome> {
    if !kernel.exists() {
        return Err(Error::missing(ArtifactKind::KernelImage, kernel));
    }

    let program = hypervisor::locate(&config.hypervisor)?;
    let launch = LaunchSpec::new(program, kernel, sockets, &config.hypervisor);
    if !launch.accelerate {
        tracing::info!(
            "{} not present, running without acceleration",
            config.hypervisor.accel_device.display()
        );
    }

    // A previous instance may have left its sockets behind
    sockets.remove();

    println!("Running command: {}", launch.display());
    let mut child = Command::new(&launch.program)
        .args(launch.args())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::spawn_fault(&launch.program, e))?;
    tracing::debug!(pid = ?child.id(), "Hypervisor started");

    let stdout = child.stdout.take().ok_or_else(|| {
        Error::spawn_fault(
            &launch.program,
            std::io::Error::other("hypervisor stdout was not captured"),
        )
    })?;
    let mut drains: Vec<JoinHandle<()>> = child
        .stderr
        .take()
        .map(|stderr| drain_lines(stderr, "qemu stderr"))
        .into_iter()
        .collect();

    let mut reader = BufReader::new(stdout);
    let spec = WatchSpec::new(&config.watch, config.timeouts.boot());
    let observation = console::watch(&mut reader, &spec).await;

    if observation.matched {
        println!("\nKernel booted successfully!");
        drains.push(drain_lines(reader, "qemu console"));
        return Ok(BootOutcome::Booted(RunningVm {
            child,
            sockets: sockets.clone(),
            observation,
            drains,
        }));
    }

    println!("\nKernel did not boot successfully.");
    tracing::info!(
        "Boot failed: {} after {} lines",
        observation.end,
        observation.lines_read
    );
    let status = terminate(&mut child, TERMINATE_GRACE).await;
    tracing::debug!("Hypervisor stopped: {:?}", status);
    for drain in drains {
        drain.abort();
    }
    sockets.remove();

    Ok(BootOutcome::Failed(observation))
}
