//! The external filter programs a pipeline is assembled from.
//!
//! Nothing here runs anything; these are the conventional program names and
//! argument vectors handed to the supervisor.

use std::env;
use std::ffi::OsString;

/// Program run by the environment-dump stage.
pub const ENV_DUMP_PROGRAM: &str = "printenv";

/// Program the filter stage runs the caller's tokens under.
pub const FILTER_PROGRAM: &str = "grep";

/// Program run by the sort stage.
pub const SORT_PROGRAM: &str = "sort";

/// Pagers tried, in order, after the preferred one (if any) fails to load.
pub const PAGER_FALLBACKS: [&str; 2] = ["less", "more"];

/// Environment variable naming the preferred pager.
pub const PAGER_ENV: &str = "PAGER";

/// One concrete command a stage can run: a program name plus the arguments
/// after it. The program is resolved through the loader's normal search path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    /// Program name.
    pub program: OsString,
    /// Arguments following the program name.
    pub args: Vec<OsString>,
}

impl StageCommand {
    /// Creates a command with no arguments.
    #[must_use]
    pub fn bare(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Creates a command with the given argument vector.
    #[must_use]
    pub fn with_args(program: impl Into<OsString>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

/// The command for the environment-dump stage.
#[must_use]
pub fn env_dump_command() -> StageCommand {
    StageCommand::bare(ENV_DUMP_PROGRAM)
}

/// The command for the filter stage.
///
/// The caller's tokens are handed over verbatim; only the program-name slot
/// in front of them changes, so flags and patterns mean whatever the filter
/// program says they mean.
#[must_use]
pub fn filter_command(tokens: Vec<OsString>) -> StageCommand {
    StageCommand::with_args(FILTER_PROGRAM, tokens)
}

/// The command for the sort stage.
#[must_use]
pub fn sort_command() -> StageCommand {
    StageCommand::bare(SORT_PROGRAM)
}

/// Pager candidates in the order they are tried: the preferred pager when
/// one is named, then the conventional fallbacks.
#[must_use]
pub fn pager_candidates(preferred: Option<OsString>) -> Vec<StageCommand> {
    let mut candidates = Vec::with_capacity(1 + PAGER_FALLBACKS.len());
    if let Some(pager) = preferred {
        candidates.push(StageCommand::bare(pager));
    }
    candidates.extend(PAGER_FALLBACKS.iter().map(|pager| StageCommand::bare(*pager)));
    candidates
}

/// Reads the preferred pager from the environment.
#[must_use]
pub fn pager_from_env() -> Option<OsString> {
    env::var_os(PAGER_ENV)
}
