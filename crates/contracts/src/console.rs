//! Console collaborator
//!
//! Operator-facing progress output and pacing between lifecycle cycles.
//! Kept out of the coordinators so they can be exercised without a terminal.

use std::fmt;

/// Severity tag printed in front of a console line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLevel {
    Info,
    Error,
}

impl fmt::Display for ReportLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => f.write_str("[INFO]"),
            Self::Error => f.write_str("[ERROR]"),
        }
    }
}

/// Console used by the session driver
///
/// Implementations must keep each reported line atomic when called from
/// several tasks.
pub trait Console: Send + Sync {
    /// Print one progress line
    fn report(&self, level: ReportLevel, line: &str);

    /// Block until the operator lets the session continue
    ///
    /// Returns `true` when the operator asked to quit.
    fn wait_for_user_continue(&self) -> bool;

    fn info(&self, line: &str) {
        self.report(ReportLevel::Info, line);
    }

    fn error(&self, line: &str) {
        self.report(ReportLevel::Error, line);
    }
}
