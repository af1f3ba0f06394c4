//! Suite execution
//!
//! Sequences corpus units through boot, introspection and shutdown, then
//! reports how many passed.

mod report;
mod runner;

pub use report::RunSummary;
pub use runner::{FailedStep, SuiteReport, SuiteRunner, UnitReport, UnitState, Verdict};
