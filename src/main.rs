//! bootci - boot-verification harness for kvm-dmesg
//!
//! Boots each kernel build of a corpus under QEMU, waits for it to come up,
//! then checks that kvm-dmesg can read the guest's kernel log over QMP.

use std::path::PathBuf;

use bootci::{cli, commands::Commands, common::logging};
use clap::Parser;

#[derive(Parser)]
#[command(name = "bootci", about = "Boot kernels under QEMU and check kvm-dmesg against them")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (default: ~/.config/kvm-dmesg-ci/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also append logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let guard = logging::init_cli(cli.verbose, cli.log_file.as_deref());

    let command = cli.command.unwrap_or_default();
    let code = match cli::dispatch(command, cli.config.as_deref()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    };

    drop(guard);
    std::process::exit(code);
}
