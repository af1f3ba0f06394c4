//! Shutdown over the QEMU human monitor socket
//!
//! Best effort: a failure is reported as [`ShutdownOutcome::Unreachable`] and
//! never escalated. The caller decides what to do with a guest that may still
//! be running.

use std::io;
use std::path::Path;
use std::time::Duration;

use interprocess::local_socket::tokio::{prelude::*, Stream};
use interprocess::local_socket::GenericFilePath;
use tokio::io::AsyncWriteExt;

/// Monitor command that stops the VM
pub const QUIT_COMMAND: &str = "quit\n";

/// What happened when asking the VM to quit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// `quit` was written to the monitor
    Sent,
    /// Connecting or writing failed
    Unreachable(String),
}

impl ShutdownOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, ShutdownOutcome::Sent)
    }
}

/// Send `quit` to the monitor at `monitor`, keep the connection open for
/// `linger`, then close it
pub async fn shutdown(monitor: &Path, linger: Duration) -> ShutdownOutcome {
    match send_command(monitor, QUIT_COMMAND, linger).await {
        Ok(()) => {
            tracing::debug!("Sent quit to {}", monitor.display());
            ShutdownOutcome::Sent
        }
        Err(e) => {
            println!("Connect monitor error: {}", e);
            tracing::warn!("Monitor at {} unreachable: {}", monitor.display(), e);
            ShutdownOutcome::Unreachable(e.to_string())
        }
    }
}

/// Write one line-oriented command to a monitor socket
pub async fn send_command(monitor: &Path, command: &str, linger: Duration) -> io::Result<()> {
    let name = monitor.to_fs_name::<GenericFilePath>()?;
    let mut stream = Stream::connect(name).await?;

    stream.write_all(command.as_bytes()).await?;
    stream.flush().await?;

    // QEMU may not have read the command yet when the peer hangs up
    tokio::time::sleep(linger).await;
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::io::AsyncReadExt;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn test_shutdown_sends_quit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mon.sock");
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut received = String::new();
            conn.read_to_string(&mut received).await.unwrap();
            received
        });

        let outcome = shutdown(&path, Duration::from_millis(10)).await;
        assert_eq!(outcome, ShutdownOutcome::Sent);
        assert_eq!(server.await.unwrap(), "quit\n");
    }

    #[tokio::test]
    async fn test_shutdown_missing_socket_is_not_fatal() {
        let dir = tempdir().unwrap();
        let outcome = shutdown(&dir.path().join("gone.sock"), Duration::from_millis(10)).await;
        assert!(matches!(outcome, ShutdownOutcome::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_shutdown_twice_on_closed_monitor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mon.sock");
        // Socket file left behind by a listener that is gone
        drop(UnixListener::bind(&path).unwrap());

        for _ in 0..2 {
            let outcome = shutdown(&path, Duration::from_millis(10)).await;
            assert!(!outcome.is_sent());
        }
    }
}
