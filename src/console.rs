//! Bounded console watch
//!
//! Both the hypervisor console and kvm-dmesg output are checked the same way:
//! read line by line until a marker substring shows up, the line budget is
//! spent, the stream closes, or a wall-clock deadline passes. Whichever comes
//! first ends the watch.

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::common::config::WatchConfig;

/// Why a watch stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEnd {
    /// The marker was found
    Marker,
    /// `max_lines` lines were read without the marker
    LineBudget,
    /// The stream closed
    Eof,
    /// The deadline passed first
    Deadline,
}

impl std::fmt::Display for WatchEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchEnd::Marker => write!(f, "marker found"),
            WatchEnd::LineBudget => write!(f, "line budget exhausted"),
            WatchEnd::Eof => write!(f, "output closed"),
            WatchEnd::Deadline => write!(f, "deadline passed"),
        }
    }
}

/// Parameters for one watch
#[derive(Debug, Clone)]
pub struct WatchSpec {
    pub marker: String,
    pub max_lines: usize,
    pub deadline: Duration,
    /// Print each line to stdout as it arrives
    pub echo: bool,
}

impl WatchSpec {
    pub fn new(watch: &WatchConfig, deadline: Duration) -> Self {
        Self {
            marker: watch.marker.clone(),
            max_lines: watch.max_lines,
            deadline,
            echo: true,
        }
    }
}

/// What a watch saw
#[derive(Debug, Clone)]
pub struct BootObservation {
    pub matched: bool,
    pub lines_read: usize,
    pub end: WatchEnd,
    /// Everything read, for diagnostics
    pub transcript: String,
}

impl BootObservation {
    fn new() -> Self {
        Self {
            matched: false,
            lines_read: 0,
            end: WatchEnd::Eof,
            transcript: String::new(),
        }
    }
}

/// Watch `reader` for `spec.marker`
///
/// Read errors end the watch like EOF does; the output is diagnostic and a
/// broken pipe just means the child is gone.
pub async fn watch<R>(reader: &mut R, spec: &WatchSpec) -> BootObservation
where
    R: AsyncBufRead + Unpin,
{
    let mut observation = BootObservation::new();

    let result =
        tokio::time::timeout(spec.deadline, read_lines(reader, spec, &mut observation)).await;
    match result {
        Ok(end) => observation.end = end,
        Err(_) => {
            tracing::debug!(
                "Watch deadline of {:?} passed after {} lines",
                spec.deadline,
                observation.lines_read
            );
            observation.end = WatchEnd::Deadline;
        }
    }

    observation.matched = observation.end == WatchEnd::Marker;
    observation
}

async fn read_lines<R>(
    reader: &mut R,
    spec: &WatchSpec,
    observation: &mut BootObservation,
) -> WatchEnd
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();

    while observation.lines_read < spec.max_lines {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => return WatchEnd::Eof,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("Read error while watching output: {}", e);
                return WatchEnd::Eof;
            }
        }

        observation.lines_read += 1;
        let line = String::from_utf8_lossy(&buf);
        if spec.echo {
            println!("{}", line.trim_end_matches(['\r', '\n']));
        }
        observation.transcript.push_str(&line);

        if line.contains(&spec.marker) {
            return WatchEnd::Marker;
        }
    }

    WatchEnd::LineBudget
}
