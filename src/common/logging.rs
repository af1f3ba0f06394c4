//! Logging and tracing configuration
//!
//! Diagnostics go to stderr through tracing. Progress lines and banners are
//! printed directly to stdout by the runner and are not part of the log.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive for a given `-v` count
fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "bootci=info,warn",
        1 => "bootci=debug,info",
        _ => "bootci=trace,info",
    }
}

/// Initialize tracing for the CLI
///
/// `RUST_LOG` wins over the verbosity flag when set. When `log_file` is given,
/// a second plain-text layer appends everything to that file; the returned guard
/// must stay alive until exit so buffered lines get flushed.
pub fn init_cli(verbosity: u8, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let mut guard = None;
    let file_layer = log_file.and_then(|path| {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(dir) {
                eprintln!("Warning: Could not create log directory: {}", e);
                return None;
            }
        }
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
        {
            Ok(file) => {
                let (writer, file_guard) = tracing_appender::non_blocking(file);
                guard = Some(file_guard);
                Some(
                    fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true),
                )
            }
            Err(e) => {
                eprintln!("Warning: Could not open log file: {}", e);
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_raises_level() {
        assert_eq!(default_directive(0), "bootci=info,warn");
        assert_eq!(default_directive(1), "bootci=debug,info");
        assert_eq!(default_directive(5), "bootci=trace,info");
    }
}
