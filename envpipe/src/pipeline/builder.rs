//! Pipeline builder: stage roster and stdio linking.

use super::spec::{InputBinding, OutputBinding, PipelinePlan, StageSpec};
use crate::stages;
use std::ffi::OsString;
use tracing::debug;

/// Assembles the filter pipeline for one invocation.
///
/// The roster is dump → sort → pager by default; supplying filter tokens
/// inserts the filter stage after the dump, growing the chain to four
/// stages. Building is infallible — nothing OS-backed is allocated until
/// [`super::Pipeline::prepare`].
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    filter_tokens: Option<Vec<OsString>>,
    pager_override: Option<OsString>,
}

impl PipelineBuilder {
    /// Creates a builder for the three-stage pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Supplies the caller's tokens. A non-empty list enables the filter
    /// stage, which receives the tokens verbatim.
    #[must_use]
    pub fn with_filter_tokens(mut self, tokens: Vec<OsString>) -> Self {
        if !tokens.is_empty() {
            self.filter_tokens = Some(tokens);
        }
        self
    }

    /// Names the pager tried before the conventional fallbacks.
    #[must_use]
    pub fn with_pager_override(mut self, pager: impl Into<OsString>) -> Self {
        self.pager_override = Some(pager.into());
        self
    }

    /// Builds the linked plan.
    #[must_use]
    pub fn build(self) -> PipelinePlan {
        let mut specs = Vec::with_capacity(4);
        specs.push(StageSpec::new(
            stages::ENV_DUMP_PROGRAM,
            stages::env_dump_command(),
        ));
        if let Some(tokens) = self.filter_tokens {
            specs.push(StageSpec::new(
                stages::FILTER_PROGRAM,
                stages::filter_command(tokens),
            ));
        }
        specs.push(StageSpec::new(stages::SORT_PROGRAM, stages::sort_command()));
        specs.push(StageSpec::with_candidates(
            "pager",
            stages::pager_candidates(self.pager_override),
        ));
        link(specs)
    }
}

/// Links a stage roster into a linear chain: the first stage keeps the
/// caller's stdin, the last keeps the caller's stdout, and each adjacent
/// pair shares one channel. Works for any roster length.
fn link(mut specs: Vec<StageSpec>) -> PipelinePlan {
    let count = specs.len();
    for (index, spec) in specs.iter_mut().enumerate() {
        spec.stdin = if index == 0 {
            InputBinding::Inherit
        } else {
            InputBinding::Channel(index - 1)
        };
        spec.stdout = if index + 1 == count {
            OutputBinding::Inherit
        } else {
            OutputBinding::Channel(index)
        };
    }
    let channel_count = count.saturating_sub(1);
    debug!(stages = count, channels = channel_count, "pipeline plan linked");
    PipelinePlan {
        stages: specs,
        channel_count,
    }
}
