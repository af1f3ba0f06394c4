//! Suite runner
//!
//! Drives every test unit through the same sequence, one unit at a time:
//!
//! ```text
//! Discovered -> ArtifactsChecked -> Booted -> Inspected -> ShutdownIssued -> Counted
//! ```
//!
//! A unit without both artifacts stops at `Discovered` and is skipped. A
//! failed boot goes straight to `Counted`: the supervisor already stopped the
//! VM, so no shutdown is sent. Once a boot succeeded, shutdown is always
//! attempted regardless of the introspection result. No step error ever stops
//! the loop.

use colored::Colorize;

use crate::common::config::Config;
use crate::common::paths::RunDir;
use crate::common::{ArtifactKind, Result};
use crate::corpus::{TestCorpus, TestUnit};
use crate::introspect;
use crate::vm::{self, BootOutcome, ShutdownOutcome, VmExit};

use super::report::RunSummary;

/// Per-unit progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Discovered,
    ArtifactsChecked,
    Booted,
    Inspected,
    ShutdownIssued,
    Counted,
}

/// The step a failed unit stopped at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedStep {
    Boot,
    Inspect,
}

/// How a unit ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed(FailedStep),
    /// Not runnable; excluded from the pass/fail counts
    Skipped(Vec<ArtifactKind>),
    /// Abandoned on SIGINT or SIGTERM; counts as not passed
    Interrupted,
}

/// Everything recorded for one unit
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub name: String,
    pub verdict: Verdict,
    /// States visited, in order
    pub trail: Vec<UnitState>,
    /// Set only when a shutdown was attempted
    pub shutdown: Option<ShutdownOutcome>,
    pub vm_exit: Option<VmExit>,
    /// Step error message, if a step failed with an error rather than a verdict
    pub error: Option<String>,
}

impl UnitReport {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            verdict: Verdict::Failed(FailedStep::Boot),
            trail: vec![UnitState::Discovered],
            shutdown: None,
            vm_exit: None,
            error: None,
        }
    }

    /// Report for a unit abandoned mid-run
    fn interrupted(name: &str) -> Self {
        Self::new(name).finish(Verdict::Interrupted)
    }

    fn advance(&mut self, state: UnitState) {
        tracing::debug!(unit = %self.name, "{:?} -> {:?}", self.state(), state);
        self.trail.push(state);
    }

    fn finish(mut self, verdict: Verdict) -> Self {
        self.verdict = verdict;
        self.advance(UnitState::Counted);
        self
    }

    /// Current state
    pub fn state(&self) -> UnitState {
        self.trail.last().copied().unwrap_or(UnitState::Discovered)
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.verdict, Verdict::Skipped(_))
    }

    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }
}

/// Outcome of a whole run
#[derive(Debug, Clone)]
pub struct SuiteReport {
    pub units: Vec<UnitReport>,
    pub summary: RunSummary,
}

/// Runs a corpus, one unit after another
pub struct SuiteRunner {
    config: Config,
    run_dir: RunDir,
}

impl SuiteRunner {
    /// Runner with a fresh run directory for control sockets
    pub fn new(config: Config) -> Result<Self> {
        let run_dir = RunDir::create()?;
        tracing::debug!("Control sockets under {}", run_dir.path().display());
        Ok(Self::with_run_dir(config, run_dir))
    }

    pub fn with_run_dir(config: Config, run_dir: RunDir) -> Self {
        Self { config, run_dir }
    }

    /// Run every unit in corpus order and print the summary
    ///
    /// SIGINT or SIGTERM abandons the unit in flight (its processes are killed
    /// when dropped) and ends the run; the summary is still printed.
    pub async fn run(&self, corpus: &TestCorpus) -> SuiteReport {
        let mut units = Vec::new();
        let mut summary = RunSummary::default();

        let interrupt = interrupted();
        tokio::pin!(interrupt);

        for (index, unit) in corpus.units().enumerate() {
            tokio::select! {
                report = self.run_unit(index, unit) => {
                    summary.count(&report);
                    units.push(report);
                }
                _ = &mut interrupt => {
                    println!("\n{}", format!("Interrupted while running {}", unit.name).yellow());
                    summary.interrupted = true;
                    if unit.is_runnable() {
                        let report = UnitReport::interrupted(&unit.name);
                        summary.count(&report);
                        units.push(report);
                    }
                    break;
                }
            }
        }

        tracing::info!(
            total = summary.total,
            passed = summary.passed,
            skipped = summary.skipped,
            "Run complete"
        );
        summary.print();

        SuiteReport { units, summary }
    }

    /// Take one unit through the state machine
    pub async fn run_unit(&self, index: usize, unit: &TestUnit) -> UnitReport {
        println!("=== {} ===", unit.name);
        let mut report = UnitReport::new(&unit.name);

        let Some((symbol_map, kernel)) = unit.artifacts() else {
            let missing = unit.missing();
            let names: Vec<String> = missing.iter().map(|k| k.to_string()).collect();
            println!("Skipped: no {}", names.join(" or "));
            tracing::info!(unit = %unit.name, "Skipping incomplete unit");
            report.verdict = Verdict::Skipped(missing);
            return report;
        };
        report.advance(UnitState::ArtifactsChecked);

        let sockets = self.run_dir.sockets(index);
        let timeouts = &self.config.timeouts;

        let vm = match vm::boot(kernel, &sockets, &self.config).await {
            Ok(BootOutcome::Booted(vm)) => vm,
            Ok(BootOutcome::Failed(_)) => {
                return report.finish(Verdict::Failed(FailedStep::Boot));
            }
            Err(e) => {
                println!("Error: {}", e);
                tracing::warn!(unit = %unit.name, "Boot step failed: {}", e);
                report.error = Some(e.to_string());
                return report.finish(Verdict::Failed(FailedStep::Boot));
            }
        };
        report.advance(UnitState::Booted);

        tracing::debug!("Waiting {:?} for the guest log to fill", timeouts.grace());
        tokio::time::sleep(timeouts.grace()).await;

        let inspected = match introspect::inspect(symbol_map, &sockets.qmp, &self.config).await {
            Ok(observation) => observation.matched,
            Err(e) => {
                println!("Error: {}", e);
                tracing::warn!(unit = %unit.name, "Inspect step failed: {}", e);
                report.error = Some(e.to_string());
                false
            }
        };
        report.advance(UnitState::Inspected);

        let shutdown = vm::shutdown(&sockets.monitor, timeouts.shutdown_linger()).await;
        if let ShutdownOutcome::Unreachable(reason) = &shutdown {
            tracing::warn!(unit = %unit.name, "Shutdown not delivered: {}", reason);
        }
        report.shutdown = Some(shutdown);
        report.advance(UnitState::ShutdownIssued);

        report.vm_exit = Some(vm.reap(timeouts.exit_wait()).await);

        let verdict = if inspected {
            Verdict::Passed
        } else {
            Verdict::Failed(FailedStep::Inspect)
        };
        report.finish(verdict)
    }
}

/// Resolves on SIGINT or SIGTERM
async fn interrupted() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => tracing::info!("Received SIGINT, stopping run"),
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM, stopping run"),
                }
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!("Could not install signal handlers: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Could not install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, stopping run");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn runner() -> (tempfile::TempDir, SuiteRunner) {
        let base = tempfile::tempdir().unwrap();
        let run_dir = RunDir::create_in(base.path()).unwrap();
        (base, SuiteRunner::with_run_dir(Config::default(), run_dir))
    }

    #[tokio::test]
    async fn test_incomplete_unit_is_skipped_at_discovered() {
        let (_base, runner) = runner();
        let unit = TestUnit {
            name: "5.4".to_string(),
            symbol_map: Some(PathBuf::from("/k/5.4/System.map-5.4")),
            kernel_image: None,
        };

        let report = runner.run_unit(0, &unit).await;
        assert!(report.is_skipped());
        assert_eq!(report.verdict, Verdict::Skipped(vec![ArtifactKind::KernelImage]));
        assert_eq!(report.trail, vec![UnitState::Discovered]);
        assert!(report.shutdown.is_none());
    }

    #[tokio::test]
    async fn test_missing_kernel_fails_boot_without_shutdown() {
        let (base, runner) = runner();
        let unit = TestUnit {
            name: "5.10".to_string(),
            symbol_map: Some(base.path().join("System.map-5.10")),
            kernel_image: Some(base.path().join("vmlinuz-5.10")),
        };

        let report = runner.run_unit(0, &unit).await;
        assert_eq!(report.verdict, Verdict::Failed(FailedStep::Boot));
        assert_eq!(
            report.trail,
            vec![
                UnitState::Discovered,
                UnitState::ArtifactsChecked,
                UnitState::Counted
            ]
        );
        assert!(report.shutdown.is_none());
        assert!(report.error.unwrap().contains("does not exist"));
    }

    #[test]
    fn test_interrupted_unit_counts_as_not_passed() {
        let report = UnitReport::interrupted("5.15");
        assert_eq!(report.verdict, Verdict::Interrupted);
        assert_eq!(report.trail, vec![UnitState::Discovered, UnitState::Counted]);

        let mut summary = RunSummary::default();
        summary.count(&report);
        assert_eq!(summary.total, 1);
        assert_eq!(summary.passed, 0);
        assert_eq!(summary.skipped, 0);
    }

    #[test]
    fn test_report_state_follows_trail() {
        let mut report = UnitReport::new("x");
        assert_eq!(report.state(), UnitState::Discovered);
        report.advance(UnitState::ArtifactsChecked);
        let report = report.finish(Verdict::Passed);
        assert_eq!(report.state(), UnitState::Counted);
        assert!(report.passed());
    }
}
