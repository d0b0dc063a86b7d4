//! Child termination status and exit-code reduction.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exit code reported for a stage that was terminated by a signal.
pub const SIGNAL_EXIT_CODE: i32 = 2;

/// How one child process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    /// The process exited on its own with the given code.
    Exited(i32),
    /// The process was terminated by the given signal.
    Signaled(i32),
}

impl ExitStatus {
    /// Returns true for a clean zero exit.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// This termination's contribution to the pipeline exit code.
    ///
    /// A normal exit contributes its own code; signal termination is
    /// normalized to [`SIGNAL_EXIT_CODE`].
    #[must_use]
    pub fn as_exit_code(&self) -> i32 {
        match self {
            Self::Exited(code) => *code,
            Self::Signaled(_) => SIGNAL_EXIT_CODE,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {code}"),
            Self::Signaled(signal) => write!(f, "terminated by signal {signal}"),
        }
    }
}

/// First-problem-wins reduction of stage terminations into one exit code.
///
/// Starts at zero and latches the first non-zero contribution recorded, in
/// the order terminations are observed; later recordings never overwrite it.
/// "First", not "last" and not "worst" — callers depend on that.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitAggregate {
    code: i32,
}

impl ExitAggregate {
    /// Creates an aggregate holding a clean zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one observed termination into the aggregate.
    pub fn record(&mut self, status: ExitStatus) {
        if self.code == 0 {
            self.code = status.as_exit_code();
        }
    }

    /// The reduced exit code.
    #[must_use]
    pub fn code(&self) -> i32 {
        self.code
    }
}
