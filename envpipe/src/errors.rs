//! Error types for pipeline setup.
//!
//! Stage-level failures (a filter exiting non-zero, a program that cannot be
//! loaded) are not errors here — they flow through the status reduction in
//! [`crate::status`]. This module only covers the setup tier: failures of the
//! supervisor's own system calls, which abort the whole invocation.

use std::io;
use thiserror::Error;

/// Errors that abort the whole invocation.
///
/// Every variant identifies the failed operation and carries the underlying
/// OS error; none of them is recoverable, and children already launched when
/// one occurs are left to run (see `DESIGN.md`).
#[derive(Debug, Error)]
pub enum SetupError {
    /// Creating the pipe behind a channel failed.
    #[error("could not create channel {index}: {source}")]
    ChannelCreate {
        /// Index of the channel that could not be created.
        index: usize,
        /// The underlying OS error.
        source: io::Error,
    },

    /// Duplicating a channel endpoint in the supervisor failed.
    #[error("could not duplicate a channel endpoint for stage '{stage}': {source}")]
    DuplicateEndpoint {
        /// Name of the stage the endpoint was being prepared for.
        stage: String,
        /// The underlying OS error.
        source: io::Error,
    },

    /// Creating a stage's child process failed.
    #[error("could not spawn stage '{stage}': {source}")]
    Spawn {
        /// Name of the stage that could not be spawned.
        stage: String,
        /// The underlying OS error.
        source: io::Error,
    },

    /// Waiting for the next child termination failed.
    #[error("wait for child termination failed: {source}")]
    Wait {
        /// The underlying OS error.
        source: io::Error,
    },
}

impl SetupError {
    /// Process exit code used when setup fails, bypassing status aggregation.
    pub const EXIT_CODE: i32 = 1;

    /// Creates a channel-creation error.
    #[must_use]
    pub fn channel_create(index: usize, source: io::Error) -> Self {
        Self::ChannelCreate { index, source }
    }

    /// Creates an endpoint-duplication error.
    #[must_use]
    pub fn duplicate_endpoint(stage: impl Into<String>, source: io::Error) -> Self {
        Self::DuplicateEndpoint {
            stage: stage.into(),
            source,
        }
    }

    /// Creates a spawn error.
    #[must_use]
    pub fn spawn(stage: impl Into<String>, source: io::Error) -> Self {
        Self::Spawn {
            stage: stage.into(),
            source,
        }
    }

    /// Creates a wait error.
    #[must_use]
    pub fn wait(source: io::Error) -> Self {
        Self::Wait { source }
    }
}
