//! Final pass/fail summary

use chrono::{DateTime, Local};
use colored::Colorize;

use super::runner::UnitReport;

/// Counters for one run
///
/// `total` only counts units that had both artifacts. Incomplete units are
/// kept out of `total` and `passed` and show up in `skipped` instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub skipped: usize,
    /// The run stopped on a signal before every unit was counted
    pub interrupted: bool,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.total - self.passed
    }

    /// Every runnable unit ran to completion and passed
    pub fn all_passed(&self) -> bool {
        !self.interrupted && self.passed == self.total
    }

    /// Add a finished unit to the counters
    pub fn count(&mut self, report: &UnitReport) {
        if report.is_skipped() {
            self.skipped += 1;
            return;
        }
        self.total += 1;
        if report.passed() {
            self.passed += 1;
        }
    }

    /// Banner text stamped with `at`, without color
    pub fn banner(&self, at: &DateTime<Local>) -> String {
        let stamp = at.format("%Y-%m-%d %H:%M:%S");
        if self.all_passed() {
            format!("{} Tests {}/{} passed!", stamp, self.passed, self.total)
        } else {
            format!("{} Tests {}/{} failed.", stamp, self.failed(), self.total)
        }
    }

    /// Print the colored banner with the current local time
    pub fn print(&self) {
        let banner = self.banner(&Local::now());
        if self.all_passed() {
            println!("\n{}", banner.green());
        } else {
            println!("\n{}", banner.red());
        }

        if self.skipped > 0 {
            println!(
                "{}",
                format!("{} skipped (incomplete artifacts)", self.skipped).yellow()
            );
        }
        if self.interrupted {
            println!("{}", "Run interrupted before all units completed".yellow());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 17, 9, 3, 7).unwrap()
    }

    #[test]
    fn test_banner_all_passed() {
        let summary = RunSummary {
            total: 3,
            passed: 3,
            ..Default::default()
        };
        assert_eq!(summary.banner(&at()), "2024-05-17 09:03:07 Tests 3/3 passed!");
    }

    #[test]
    fn test_banner_reports_failures() {
        let summary = RunSummary {
            total: 4,
            passed: 1,
            skipped: 2,
            interrupted: false,
        };
        assert_eq!(summary.failed(), 3);
        assert_eq!(summary.banner(&at()), "2024-05-17 09:03:07 Tests 3/4 failed.");
    }

    #[test]
    fn test_interrupted_run_never_passes() {
        let summary = RunSummary {
            total: 2,
            passed: 1,
            interrupted: true,
            ..Default::default()
        };
        assert!(!summary.all_passed());
        assert_eq!(summary.banner(&at()), "2024-05-17 09:03:07 Tests 1/2 failed.");

        let before_any_unit = RunSummary {
            interrupted: true,
            ..Default::default()
        };
        assert!(!before_any_unit.all_passed());
    }

    #[test]
    fn test_empty_run_counts_as_passed() {
        let summary = RunSummary {
            skipped: 2,
            ..Default::default()
        };
        assert!(summary.all_passed());
        assert_eq!(summary.banner(&at()), "2024-05-17 09:03:07 Tests 0/0 passed!");
    }
}
