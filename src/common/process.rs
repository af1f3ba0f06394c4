//! Child process helpers shared by the VM supervisor and the introspection runner

use std::process::ExitStatus;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;

/// How long a child gets to exit after SIGTERM before it is killed
pub const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Ask a child to exit, then kill it if it does not
///
/// Sends SIGTERM first, waits up to `grace`, then falls back to SIGKILL.
/// Returns the exit status when it could be collected.
pub async fn terminate(child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    if let Ok(Some(status)) = child.try_wait() {
        return Some(status);
    }

    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // SAFETY: pid belongs to a child we have not reaped yet
        let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if result == 0 {
            if let Ok(Ok(status)) = tokio::time::timeout(grace, child.wait()).await {
                return Some(status);
            }
        }
    }

    if let Err(e) = child.start_kill() {
        tracing::debug!("start_kill failed: {}", e);
    }
    match child.wait().await {
        Ok(status) => Some(status),
        Err(e) => {
            tracing::warn!("Failed to reap child process: {}", e);
            None
        }
    }
}

/// Read a stream to the end in the background, logging each line at trace level
pub fn drain_lines<R>(reader: R, label: &'static str) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    tracing::trace!(target: "bootci::drain", "{}: {}", label, line.trim_end());
                }
                Err(e) => {
                    tracing::trace!(target: "bootci::drain", "{}: stopped draining: {}", label, e);
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    #[tokio::test]
    async fn test_terminate_stops_sleeping_child() {
        let mut child = Command::new("sleep")
            .arg("60")
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let status = terminate(&mut child, Duration::from_secs(2)).await;
        let status = status.expect("exit status");
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_terminate_already_exited() {
        let mut child = Command::new("true").spawn().unwrap();
        child.wait().await.unwrap();
        let status = terminate(&mut child, Duration::from_millis(100)).await;
        assert!(status.unwrap().success());
    }
}
