//! Run kvm-dmesg against a booted guest
//!
//! kvm-dmesg reads the guest kernel log over QMP using the build's symbol map
//! and prints it. Seeing the kernel banner in that output means introspection
//! works for this build.

use std::path::Path;
use std::process::Stdio;

use colored::Colorize;
use tokio::io::BufReader;
use tokio::process::Command;

use crate::common::config::Config;
use crate::common::process::{drain_lines, terminate, TERMINATE_GRACE};
use crate::common::{ArtifactKind, Error, Result};
use crate::console::{self, BootObservation, WatchSpec};

/// Run the introspection tool and watch its output for the marker
///
/// Prints a "Test ok!" or "Test failed." banner. The tool is stopped before
/// this returns either way.
pub async fn inspect(
    symbol_map: &Path,
    qmp_socket: &Path,
    config: &Config,
) -> Result<BootObservation> {
    if !symbol_map.exists() {
        return Err(Error::missing(ArtifactKind::SymbolMap, symbol_map));
    }

    let tool = &config.tool.path;
    if !tool.exists() {
        return Err(Error::ToolNotFound { path: tool.clone() });
    }

    println!(
        "Running command: {} {} {}",
        tool.display(),
        symbol_map.display(),
        qmp_socket.display()
    );
    let mut child = Command::new(tool)
        .arg(symbol_map)
        .arg(qmp_socket)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::spawn_fault(tool, e))?;

    let stdout = child.stdout.take().ok_or_else(|| {
        Error::spawn_fault(tool, std::io::Error::other("tool stdout was not captured"))
    })?;
    let stderr_drain = child
        .stderr
        .take()
        .map(|stderr| drain_lines(stderr, "kvm-dmesg stderr"));

    let mut reader = BufReader::new(stdout);
    let spec = WatchSpec::new(&config.watch, config.timeouts.inspect());
    let observation = console::watch(&mut reader, &spec).await;

    if observation.matched {
        println!("\n{}\n", "Test ok!".green());
        // Let it finish printing the log, but do not wait on it for long
        let stdout_drain = drain_lines(reader, "kvm-dmesg");
        match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
            Ok(Ok(status)) => tracing::debug!("kvm-dmesg exited with {}", status),
            _ => {
                terminate(&mut child, TERMINATE_GRACE).await;
            }
        }
        stdout_drain.abort();
    } else {
        println!("\n{}\n", "Test failed.".red());
        tracing::info!(
            "Introspection failed: {} after {} lines",
            observation.end,
            observation.lines_read
        );
        terminate(&mut child, TERMINATE_GRACE).await;
    }

    if let Some(drain) = stderr_drain {
        drain.abort();
    }
    Ok(observation)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::console::WatchEnd;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn fake_tool(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("kvm-dmesg");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn config_with_tool(tool: PathBuf) -> Config {
        let mut config = Config::default();
        config.tool.path = tool;
        config.timeouts.inspect_secs = 5;
        config
    }

    fn symbol_map(dir: &Path) -> PathBuf {
        let path = dir.join("System.map-5.10");
        std::fs::write(&path, "ffffffff81000000 T _stext\n").unwrap();
        path
    }

    #[tokio::test]
    async fn test_inspect_passes_arguments_and_finds_marker() {
        let dir = tempdir().unwrap();
        let map = symbol_map(dir.path());
        let args_file = dir.path().join("args");
        let tool = fake_tool(
            dir.path(),
            &format!(
                "echo \"$1 $2\" > {}\necho '[    0.000000] Linux version 5.10.0'",
                args_file.display()
            ),
        );
        let qmp = dir.path().join("0-qmp.sock");

        let obs = inspect(&map, &qmp, &config_with_tool(tool)).await.unwrap();
        assert!(obs.matched);

        let args = std::fs::read_to_string(&args_file).unwrap();
        assert_eq!(args.trim(), format!("{} {}", map.display(), qmp.display()));
    }

    #[tokio::test]
    async fn test_inspect_fails_without_marker() {
        let dir = tempdir().unwrap();
        let map = symbol_map(dir.path());
        let tool = fake_tool(dir.path(), "echo 'qmp: connection refused'\nexit 1");

        let obs = inspect(&map, &dir.path().join("qmp.sock"), &config_with_tool(tool))
            .await
            .unwrap();
        assert!(!obs.matched);
        assert_eq!(obs.end, WatchEnd::Eof);
        assert!(obs.transcript.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_inspect_tool_missing() {
        let dir = tempdir().unwrap();
        let map = symbol_map(dir.path());
        let config = config_with_tool(dir.path().join("kvm-dmesg"));

        let result = inspect(&map, &dir.path().join("qmp.sock"), &config).await;
        assert!(matches!(result, Err(Error::ToolNotFound { .. })));
    }

    #[tokio::test]
    async fn test_inspect_symbol_map_missing() {
        let dir = tempdir().unwrap();
        let tool = fake_tool(dir.path(), "exit 0");

        let result = inspect(
            &dir.path().join("System.map-none"),
            &dir.path().join("qmp.sock"),
            &config_with_tool(tool),
        )
        .await;
        assert!(matches!(
            result,
            Err(Error::MissingArtifact {
                kind: ArtifactKind::SymbolMap,
                ..
            })
        ));
    }
}
