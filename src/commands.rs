//! CLI command definitions
//!
//! Defines the clap commands for the harness. Running without a command is
//! the same as `run` with no options.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::common::config::Config;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Boot every kernel in the corpus and check kvm-dmesg against it
    Run(RunArgs),

    /// List discovered test units without booting anything
    List {
        /// Corpus root (default: kvm-dmesg-ci/kernels)
        corpus: Option<PathBuf>,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Run(RunArgs::default())
    }
}

/// Options for `run`
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Corpus root (default: kvm-dmesg-ci/kernels)
    pub corpus: Option<PathBuf>,

    /// Path to the kvm-dmesg executable
    #[arg(long)]
    pub tool: Option<PathBuf>,

    /// Path to the QEMU executable, skips the search
    #[arg(long)]
    pub hypervisor: Option<PathBuf>,

    /// Seconds to wait for the kernel banner on the console
    #[arg(long, value_name = "SECS")]
    pub boot_timeout: Option<u64>,

    /// Seconds to wait for the kernel banner in kvm-dmesg output
    #[arg(long, value_name = "SECS")]
    pub inspect_timeout: Option<u64>,

    /// Seconds between boot and introspection
    #[arg(long, value_name = "SECS")]
    pub grace: Option<u64>,

    /// Exit with status 2 when any unit failed
    #[arg(long)]
    pub strict: bool,
}

impl RunArgs {
    /// Apply command line overrides on top of the loaded config
    pub fn apply(&self, config: &mut Config) {
        if let Some(corpus) = &self.corpus {
            config.corpus.root = corpus.clone();
        }
        if let Some(tool) = &self.tool {
            config.tool.path = tool.clone();
        }
        if let Some(hypervisor) = &self.hypervisor {
            config.hypervisor.path = Some(hypervisor.clone());
        }
        if let Some(secs) = self.boot_timeout {
            config.timeouts.boot_secs = secs;
        }
        if let Some(secs) = self.inspect_timeout {
            config.timeouts.inspect_secs = secs;
        }
        if let Some(secs) = self.grace {
            config.timeouts.grace_secs = secs;
        }
    }
}
