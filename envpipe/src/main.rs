//! `envpipe` — dump the process environment through a filter pipeline.
//!
//! Equivalent to `printenv [| grep ARGS] | sort | pager`: every invocation
//! token goes verbatim to the filter stage, the pager honors `PAGER` before
//! falling back to `less` and `more`, and the process exit code is the
//! pipeline's aggregate status.

use std::env;
use std::process;

use anyhow::Context;
use envpipe::errors::SetupError;
use envpipe::observability;
use envpipe::pipeline::{Pipeline, PipelineBuilder};
use envpipe::stages;
use envpipe::supervisor::{OsProcessHost, Supervisor};

fn main() {
    observability::init("warn");

    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("pipeline setup failed: {err:#}");
            SetupError::EXIT_CODE
        }
    };
    process::exit(code);
}

fn run() -> anyhow::Result<i32> {
    let tokens: Vec<_> = env::args_os().skip(1).collect();

    let mut builder = PipelineBuilder::new().with_filter_tokens(tokens);
    if let Some(pager) = stages::pager_from_env() {
        builder = builder.with_pager_override(pager);
    }

    let pipeline = Pipeline::prepare(builder.build()).context("setting up pipeline channels")?;
    let outcome = Supervisor::new(OsProcessHost::new())
        .run(pipeline)
        .context("running pipeline")?;
    Ok(outcome.exit_code())
}
