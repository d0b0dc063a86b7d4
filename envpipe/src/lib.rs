//! # Envpipe
//!
//! Dumps the process environment through a short pipeline of external
//! filters — `printenv [| grep ARGS] | sort | pager` — and reduces the
//! stages' terminations into a single exit status.
//!
//! The crate provides:
//!
//! - **Pipeline building**: a builder that decides the stage roster (three
//!   stages, or four when filter tokens are supplied) and links stdio
//!   bindings across the linear chain
//! - **Channels**: OS pipes held as owned endpoint pairs, so the closing
//!   discipline is ownership transfer rather than descriptor bookkeeping
//! - **Supervision**: launching each stage with its endpoints rewired onto
//!   stdio, then reaping every child in arrival order and reducing their
//!   statuses with a first-problem-wins policy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use envpipe::pipeline::{Pipeline, PipelineBuilder};
//! use envpipe::supervisor::{OsProcessHost, Supervisor};
//!
//! # fn main() -> Result<(), envpipe::errors::SetupError> {
//! let plan = PipelineBuilder::new()
//!     .with_filter_tokens(vec!["PATH".into()])
//!     .build();
//! let pipeline = Pipeline::prepare(plan)?;
//! let outcome = Supervisor::new(OsProcessHost::new()).run(pipeline)?;
//! std::process::exit(outcome.exit_code());
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod channel;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod status;
pub mod supervisor;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::channel::Channel;
    pub use crate::errors::SetupError;
    pub use crate::pipeline::{
        InputBinding, OutputBinding, Pipeline, PipelineBuilder, PipelinePlan, StageSpec,
    };
    pub use crate::stages::StageCommand;
    pub use crate::status::{ExitAggregate, ExitStatus, SIGNAL_EXIT_CODE};
    pub use crate::supervisor::{
        ChildHandle, OsProcessHost, PipelineOutcome, ProcessHost, Redirect, Supervisor,
    };
}
