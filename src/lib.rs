//! Boot-verification harness for kvm-dmesg
//!
//! Discovers kernel builds, boots each one under QEMU, runs kvm-dmesg against
//! the running guest over QMP, shuts the guest down through the monitor, and
//! tallies the results.

pub mod cli;
pub mod commands;
pub mod common;
pub mod console;
pub mod corpus;
pub mod introspect;
pub mod testing;
pub mod vm;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use corpus::{TestCorpus, TestUnit};
