//! Virtual machine lifecycle: locate QEMU, boot a kernel, shut it down

pub mod hypervisor;
pub mod monitor;
pub mod supervisor;

pub use monitor::{shutdown, ShutdownOutcome};
pub use supervisor::{boot, BootOutcome, RunningVm, VmExit};
