//! Pipeline building and preparation.
//!
//! This module provides:
//! - Stage and pipeline descriptions (pure data)
//! - The builder that decides the stage roster and links stdio bindings
//! - Channel allocation, turning a plan into something launchable

mod builder;
mod spec;

pub use builder::PipelineBuilder;
pub use spec::{InputBinding, OutputBinding, PipelinePlan, StageSpec};

use crate::channel::Channel;
use crate::errors::SetupError;

/// A plan with its channels allocated, ready to launch.
#[derive(Debug)]
pub struct Pipeline {
    /// The linked stage descriptions.
    pub plan: PipelinePlan,
    /// Live channels, one per adjacent stage pair.
    pub channels: Vec<Channel>,
}

impl Pipeline {
    /// Allocates the plan's channels.
    ///
    /// Fails on the first channel that cannot be created; no stage has been
    /// spawned at that point, so the invocation aborts with nothing left
    /// running.
    pub fn prepare(plan: PipelinePlan) -> Result<Self, SetupError> {
        let mut channels = Vec::with_capacity(plan.channel_count);
        for index in 0..plan.channel_count {
            channels.push(Channel::open(index)?);
        }
        Ok(Self { plan, channels })
    }
}
