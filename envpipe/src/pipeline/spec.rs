//! Pipeline and stage descriptions.

use crate::stages::StageCommand;
use serde::{Deserialize, Serialize};

/// Where a stage's standard input comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputBinding {
    /// Inherit the pipeline's own standard input.
    Inherit,
    /// The read endpoint of the channel with this index.
    Channel(usize),
}

/// Where a stage's standard output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputBinding {
    /// Inherit the pipeline's own standard output.
    Inherit,
    /// The write endpoint of the channel with this index.
    Channel(usize),
}

/// One planned stage: a name for diagnostics, the candidate commands tried
/// in order at launch, and the stdio bindings. Immutable once the plan is
/// linked; no process exists yet when a spec is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    /// Stage name used in diagnostics.
    pub name: String,
    /// Commands tried in order until one loads. Every stage has at least
    /// one; only the pager carries more.
    pub candidates: Vec<StageCommand>,
    /// Standard-input wiring.
    pub stdin: InputBinding,
    /// Standard-output wiring.
    pub stdout: OutputBinding,
}

impl StageSpec {
    /// Creates a spec running a single command; stdio is inherited until the
    /// plan is linked.
    #[must_use]
    pub fn new(name: impl Into<String>, command: StageCommand) -> Self {
        Self::with_candidates(name, vec![command])
    }

    /// Creates a spec with an ordered candidate chain.
    #[must_use]
    pub fn with_candidates(name: impl Into<String>, candidates: Vec<StageCommand>) -> Self {
        Self {
            name: name.into(),
            candidates,
            stdin: InputBinding::Inherit,
            stdout: OutputBinding::Inherit,
        }
    }
}

/// A fully linked pipeline description: stages in source-to-sink order plus
/// the number of channels connecting adjacent pairs. Pure data — no live
/// descriptors yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePlan {
    /// The linked stages, source first.
    pub stages: Vec<StageSpec>,
    /// Number of channels; always one less than the number of stages.
    pub channel_count: usize,
}

impl PipelinePlan {
    /// Number of stages in the plan.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}
