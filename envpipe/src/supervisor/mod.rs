//! Stage launching and child supervision.
//!
//! The supervisor walks a prepared pipeline source-to-sink, spawning one
//! child per stage with its stdio rewired onto the right channel endpoints,
//! releasing every endpoint the parent no longer needs, and then reaping all
//! children in arrival order while reducing their terminations into a single
//! exit code.

mod host;

pub use host::{ChildId, OsProcessHost, ProcessHost, Redirect};

use crate::channel::Channel;
use crate::errors::SetupError;
use crate::pipeline::{InputBinding, OutputBinding, Pipeline, StageSpec};
use crate::status::{ExitAggregate, ExitStatus};
use std::io;
use tracing::{debug, error, warn};

/// Exit code recorded for a stage whose program could not be loaded.
pub const EXEC_FAILURE_EXIT_CODE: i32 = 1;

/// One launched stage awaiting its termination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildHandle {
    /// Host-reported child identity.
    pub id: ChildId,
    /// Index of the stage in the plan.
    pub stage_index: usize,
    /// Stage name, for diagnostics.
    pub stage_name: String,
}

/// One observed stage termination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTermination {
    /// Index of the stage in the plan.
    pub stage_index: usize,
    /// Stage name.
    pub stage_name: String,
    /// How the stage went down.
    pub status: ExitStatus,
}

/// What one finished pipeline run looked like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// Terminations in the order they were observed.
    pub terminations: Vec<StageTermination>,
    aggregate: ExitAggregate,
}

impl PipelineOutcome {
    /// The process-wide exit code: zero unless some stage failed, in which
    /// case the first observed problem wins.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.aggregate.code()
    }
}

/// Launches a prepared pipeline and reduces its children's terminations.
#[derive(Debug)]
pub struct Supervisor<H> {
    host: H,
}

impl<H: ProcessHost> Supervisor<H> {
    /// Creates a supervisor driving the given host.
    #[must_use]
    pub fn new(host: H) -> Self {
        Self { host }
    }

    /// Runs the pipeline to completion.
    ///
    /// Returns a [`SetupError`] when a channel endpoint cannot be
    /// duplicated, a spawn fails for any reason other than the stage's
    /// program being unloadable, or the wait call fails. Children already
    /// launched are not cleaned up on such an abort; the error path only
    /// logs what was left behind.
    pub fn run(&mut self, pipeline: Pipeline) -> Result<PipelineOutcome, SetupError> {
        let Pipeline { plan, mut channels } = pipeline;
        let mut children = Vec::with_capacity(plan.stages.len());
        let mut terminations = Vec::with_capacity(plan.stages.len());
        let mut aggregate = ExitAggregate::new();

        for (index, stage) in plan.stages.iter().enumerate() {
            match self.launch(stage, &mut channels) {
                Ok(Some(id)) => children.push(ChildHandle {
                    id,
                    stage_index: index,
                    stage_name: stage.name.clone(),
                }),
                Ok(None) => {
                    // None of the stage's candidates could be loaded; it
                    // counts as terminated with the conventional code.
                    let status = ExitStatus::Exited(EXEC_FAILURE_EXIT_CODE);
                    aggregate.record(status);
                    terminations.push(StageTermination {
                        stage_index: index,
                        stage_name: stage.name.clone(),
                        status,
                    });
                }
                Err(err) => {
                    abandon(&children);
                    return Err(err);
                }
            }
            // Both endpoints of the channel behind this stage have moved
            // into children by now; nothing upstream is wired again, so the
            // supervisor lets go of whatever the channel still holds. A
            // write endpoint lingering here would starve the reader of
            // end-of-stream.
            if index >= 1 {
                retire_channel(index - 1, &mut channels);
            }
        }

        if let Err(err) = self.reap_all(&children, &mut terminations, &mut aggregate) {
            abandon(&children);
            return Err(err);
        }

        Ok(PipelineOutcome {
            terminations,
            aggregate,
        })
    }

    /// Wires up and spawns one stage. `Ok(None)` means none of the stage's
    /// candidate commands could be loaded.
    fn launch(
        &mut self,
        stage: &StageSpec,
        channels: &mut [Channel],
    ) -> Result<Option<ChildId>, SetupError> {
        let stdin = input_redirect(stage, channels);
        let stdout = output_redirect(stage, channels);
        self.spawn_with_fallback(stage, stdin, stdout)
    }

    /// Tries the stage's candidates in order until one loads.
    ///
    /// Non-final attempts receive duplicated endpoints so a failed load does
    /// not cost the endpoints the next candidate needs; the final attempt
    /// consumes the originals.
    fn spawn_with_fallback(
        &mut self,
        stage: &StageSpec,
        mut stdin: Redirect,
        mut stdout: Redirect,
    ) -> Result<Option<ChildId>, SetupError> {
        let last = stage.candidates.len().saturating_sub(1);
        for (attempt, candidate) in stage.candidates.iter().enumerate() {
            let (attempt_stdin, attempt_stdout) = if attempt == last {
                (
                    std::mem::replace(&mut stdin, Redirect::Inherit),
                    std::mem::replace(&mut stdout, Redirect::Inherit),
                )
            } else {
                let dup_in = stdin
                    .try_clone()
                    .map_err(|err| SetupError::duplicate_endpoint(&stage.name, err))?;
                let dup_out = stdout
                    .try_clone()
                    .map_err(|err| SetupError::duplicate_endpoint(&stage.name, err))?;
                (dup_in, dup_out)
            };

            match self.host.spawn(candidate, attempt_stdin, attempt_stdout) {
                Ok(id) => {
                    debug!(
                        stage = %stage.name,
                        program = ?candidate.program,
                        child = id,
                        "stage launched"
                    );
                    return Ok(Some(id));
                }
                Err(err) if image_load_failure(&err) => {
                    warn!(
                        stage = %stage.name,
                        program = ?candidate.program,
                        error = %err,
                        "stage program could not be loaded"
                    );
                }
                Err(err) => return Err(SetupError::spawn(&stage.name, err)),
            }
        }
        error!(stage = %stage.name, "no candidate program could be loaded");
        Ok(None)
    }

    /// Reaps every launched child in arrival order, folding each
    /// termination into the aggregate.
    fn reap_all(
        &mut self,
        children: &[ChildHandle],
        terminations: &mut Vec<StageTermination>,
        aggregate: &mut ExitAggregate,
    ) -> Result<(), SetupError> {
        let mut reaped = 0;
        while reaped < children.len() {
            let (id, status) = self.host.wait_any().map_err(SetupError::wait)?;
            let Some(child) = children.iter().find(|c| c.id == id) else {
                warn!(child = id, "reaped a child no stage accounts for");
                continue;
            };
            debug!(
                stage = %child.stage_name,
                child = id,
                status = %status,
                "stage terminated"
            );
            aggregate.record(status);
            terminations.push(StageTermination {
                stage_index: child.stage_index,
                stage_name: child.stage_name.clone(),
                status,
            });
            reaped += 1;
        }
        Ok(())
    }
}

/// Resolves a stage's input binding, moving the endpoint out of its channel.
fn input_redirect(stage: &StageSpec, channels: &mut [Channel]) -> Redirect {
    match stage.stdin {
        InputBinding::Inherit => Redirect::Inherit,
        InputBinding::Channel(index) => Redirect::Endpoint(
            channels[index]
                .take_reader()
                .expect("channel read endpoint bound to more than one stage"),
        ),
    }
}

/// Resolves a stage's output binding, moving the endpoint out of its channel.
fn output_redirect(stage: &StageSpec, channels: &mut [Channel]) -> Redirect {
    match stage.stdout {
        OutputBinding::Inherit => Redirect::Inherit,
        OutputBinding::Channel(index) => Redirect::Endpoint(
            channels[index]
                .take_writer()
                .expect("channel write endpoint bound to more than one stage"),
        ),
    }
}

/// Lets go of both ends of a channel the supervisor no longer needs.
fn retire_channel(index: usize, channels: &mut [Channel]) {
    if let Some(channel) = channels.get_mut(index) {
        channel.close();
        debug!(channel = index, "channel endpoints released");
    }
}

/// Launch aborted mid-pipeline: report the children that stay behind.
fn abandon(children: &[ChildHandle]) {
    for child in children {
        warn!(
            stage = %child.stage_name,
            child = child.id,
            "leaving launched stage behind on abort"
        );
    }
}

/// Spawn failures that mean "this program cannot be loaded" rather than
/// "the system cannot create a process right now".
fn image_load_failure(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Pipeline, PipelineBuilder, PipelinePlan};
    use crate::stages::StageCommand;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::ffi::OsString;
    use std::sync::Mutex;

    /// Host that records spawn requests and replays a canned termination
    /// sequence, so nothing here creates a process.
    struct ScriptedHost {
        spawn_plan: VecDeque<Option<io::ErrorKind>>,
        wait_script: VecDeque<(ChildId, ExitStatus)>,
        spawned: Vec<SpawnRecord>,
        next_id: ChildId,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct SpawnRecord {
        program: OsString,
        args: Vec<OsString>,
        stdin: RedirectKind,
        stdout: RedirectKind,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum RedirectKind {
        Inherit,
        Endpoint,
    }

    fn kind_of(redirect: &Redirect) -> RedirectKind {
        match redirect {
            Redirect::Inherit => RedirectKind::Inherit,
            Redirect::Endpoint(_) => RedirectKind::Endpoint,
        }
    }

    impl ScriptedHost {
        fn new() -> Self {
            Self {
                spawn_plan: VecDeque::new(),
                wait_script: VecDeque::new(),
                spawned: Vec::new(),
                next_id: 100,
            }
        }

        /// Scripts the outcome of the next spawn attempts; `None` succeeds.
        fn with_spawn_plan(mut self, plan: Vec<Option<io::ErrorKind>>) -> Self {
            self.spawn_plan = plan.into();
            self
        }

        /// Scripts the termination sequence reported by `wait_any`.
        fn with_wait_script(mut self, script: Vec<(ChildId, ExitStatus)>) -> Self {
            self.wait_script = script.into();
            self
        }

        fn programs(&self) -> Vec<OsString> {
            self.spawned.iter().map(|r| r.program.clone()).collect()
        }
    }

    impl ProcessHost for ScriptedHost {
        fn spawn(
            &mut self,
            command: &StageCommand,
            stdin: Redirect,
            stdout: Redirect,
        ) -> io::Result<ChildId> {
            self.spawned.push(SpawnRecord {
                program: command.program.clone(),
                args: command.args.clone(),
                stdin: kind_of(&stdin),
                stdout: kind_of(&stdout),
            });
            match self.spawn_plan.pop_front().flatten() {
                Some(kind) => Err(io::Error::from(kind)),
                None => {
                    self.next_id += 1;
                    Ok(self.next_id)
                }
            }
        }

        fn wait_any(&mut self) -> io::Result<(ChildId, ExitStatus)> {
            self.wait_script
                .pop_front()
                .ok_or_else(|| io::Error::other("no scripted termination left"))
        }
    }

    fn prepared(builder: PipelineBuilder) -> Pipeline {
        Pipeline::prepare(builder.build()).unwrap()
    }

    #[test]
    fn test_runs_all_stages_and_reports_zero() {
        let host = ScriptedHost::new().with_wait_script(vec![
            (101, ExitStatus::Exited(0)),
            (102, ExitStatus::Exited(0)),
            (103, ExitStatus::Exited(0)),
        ]);
        let mut supervisor = Supervisor::new(host);

        let outcome = supervisor.run(prepared(PipelineBuilder::new())).unwrap();

        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(outcome.terminations.len(), 3);
        assert_eq!(
            supervisor.host.programs(),
            vec![
                OsString::from("printenv"),
                OsString::from("sort"),
                OsString::from("less"),
            ]
        );
    }

    #[test]
    fn test_stage_stdio_wiring() {
        let host = ScriptedHost::new().with_wait_script(vec![
            (101, ExitStatus::Exited(0)),
            (102, ExitStatus::Exited(0)),
            (103, ExitStatus::Exited(0)),
            (104, ExitStatus::Exited(0)),
        ]);
        let mut supervisor = Supervisor::new(host);

        let pipeline = prepared(PipelineBuilder::new().with_filter_tokens(vec!["x".into()]));
        supervisor.run(pipeline).unwrap();

        let wiring: Vec<_> = supervisor
            .host
            .spawned
            .iter()
            .map(|r| (r.stdin, r.stdout))
            .collect();
        assert_eq!(
            wiring,
            vec![
                (RedirectKind::Inherit, RedirectKind::Endpoint),
                (RedirectKind::Endpoint, RedirectKind::Endpoint),
                (RedirectKind::Endpoint, RedirectKind::Endpoint),
                (RedirectKind::Endpoint, RedirectKind::Inherit),
            ]
        );
    }

    #[test]
    fn test_filter_stage_spawns_with_tokens_verbatim() {
        let host = ScriptedHost::new().with_wait_script(vec![
            (101, ExitStatus::Exited(0)),
            (102, ExitStatus::Exited(0)),
            (103, ExitStatus::Exited(0)),
            (104, ExitStatus::Exited(0)),
        ]);
        let mut supervisor = Supervisor::new(host);

        let pipeline =
            prepared(PipelineBuilder::new().with_filter_tokens(vec!["-i".into(), "user".into()]));
        supervisor.run(pipeline).unwrap();

        let filter = &supervisor.host.spawned[1];
        assert_eq!(filter.program, OsString::from("grep"));
        assert_eq!(filter.args, vec![OsString::from("-i"), OsString::from("user")]);
    }

    #[test]
    fn test_aggregate_takes_first_problem_in_reap_order() {
        let host = ScriptedHost::new().with_wait_script(vec![
            (102, ExitStatus::Exited(0)),
            (103, ExitStatus::Exited(3)),
            (101, ExitStatus::Exited(5)),
        ]);
        let mut supervisor = Supervisor::new(host);

        let outcome = supervisor.run(prepared(PipelineBuilder::new())).unwrap();

        assert_eq!(outcome.exit_code(), 3);
        assert_eq!(outcome.terminations[1].stage_index, 2);
    }

    #[test]
    fn test_signal_reaped_first_wins_as_distinguished_code() {
        let host = ScriptedHost::new().with_wait_script(vec![
            (101, ExitStatus::Signaled(15)),
            (102, ExitStatus::Exited(7)),
            (103, ExitStatus::Exited(0)),
        ]);
        let mut supervisor = Supervisor::new(host);

        let outcome = supervisor.run(prepared(PipelineBuilder::new())).unwrap();

        assert_eq!(outcome.exit_code(), crate::status::SIGNAL_EXIT_CODE);
        assert_eq!(outcome.terminations[0].stage_index, 0);
    }

    #[test]
    fn test_pager_fallback_tries_candidates_in_order() {
        let host = ScriptedHost::new()
            .with_spawn_plan(vec![
                None,
                None,
                Some(io::ErrorKind::NotFound),
                Some(io::ErrorKind::NotFound),
                None,
            ])
            .with_wait_script(vec![
                (101, ExitStatus::Exited(0)),
                (102, ExitStatus::Exited(0)),
                (103, ExitStatus::Exited(0)),
            ]);
        let mut supervisor = Supervisor::new(host);

        let pipeline = prepared(PipelineBuilder::new().with_pager_override("missing-pager"));
        let outcome = supervisor.run(pipeline).unwrap();

        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(
            supervisor.host.programs(),
            vec![
                OsString::from("printenv"),
                OsString::from("sort"),
                OsString::from("missing-pager"),
                OsString::from("less"),
                OsString::from("more"),
            ]
        );
    }

    #[test]
    fn test_unloadable_stage_counts_as_failed_termination() {
        let host = ScriptedHost::new()
            .with_spawn_plan(vec![
                None,
                None,
                Some(io::ErrorKind::NotFound),
                Some(io::ErrorKind::NotFound),
                Some(io::ErrorKind::NotFound),
            ])
            .with_wait_script(vec![
                (101, ExitStatus::Exited(0)),
                (102, ExitStatus::Exited(0)),
            ]);
        let mut supervisor = Supervisor::new(host);

        let pipeline = prepared(PipelineBuilder::new().with_pager_override("missing-pager"));
        let outcome = supervisor.run(pipeline).unwrap();

        assert_eq!(outcome.exit_code(), EXEC_FAILURE_EXIT_CODE);
        assert_eq!(outcome.terminations.len(), 3);
        let pager = &outcome.terminations[0];
        assert_eq!(pager.stage_name, "pager");
        assert_eq!(pager.status, ExitStatus::Exited(EXEC_FAILURE_EXIT_CODE));
    }

    #[test]
    fn test_spawn_failure_aborts_whole_invocation() {
        let host = ScriptedHost::new()
            .with_spawn_plan(vec![None, Some(io::ErrorKind::OutOfMemory)]);
        let mut supervisor = Supervisor::new(host);

        let err = supervisor
            .run(prepared(PipelineBuilder::new()))
            .unwrap_err();

        assert!(matches!(err, SetupError::Spawn { ref stage, .. } if stage == "sort"));
    }

    #[test]
    fn test_wait_failure_is_fatal() {
        let host = ScriptedHost::new().with_wait_script(vec![
            (101, ExitStatus::Exited(0)),
            (102, ExitStatus::Exited(0)),
        ]);
        let mut supervisor = Supervisor::new(host);

        let err = supervisor
            .run(prepared(PipelineBuilder::new()))
            .unwrap_err();

        assert!(matches!(err, SetupError::Wait { .. }));
    }

    #[test]
    fn test_unknown_child_termination_is_skipped() {
        let host = ScriptedHost::new().with_wait_script(vec![
            (999, ExitStatus::Exited(9)),
            (101, ExitStatus::Exited(0)),
            (102, ExitStatus::Exited(0)),
            (103, ExitStatus::Exited(0)),
        ]);
        let mut supervisor = Supervisor::new(host);

        let outcome = supervisor.run(prepared(PipelineBuilder::new())).unwrap();

        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(outcome.terminations.len(), 3);
    }

    #[test]
    fn test_supervisor_releases_every_channel_as_it_goes() {
        let plan = PipelineBuilder::new()
            .with_filter_tokens(vec!["x".into()])
            .build();
        let Pipeline { plan, mut channels } = Pipeline::prepare(plan).unwrap();
        let mut supervisor = Supervisor::new(ScriptedHost::new());

        for (index, stage) in plan.stages.iter().enumerate() {
            supervisor.launch(stage, &mut channels).unwrap();
            if index >= 1 {
                retire_channel(index - 1, &mut channels);
                assert!(channels[index - 1].is_closed());
            }
        }
        assert!(channels.iter().all(|c| c.is_closed()));
    }

    // The tests below drive real child processes. `wait` reaps any child of
    // the test binary, so they must not overlap with each other.
    static REAL_HOST_LOCK: Mutex<()> = Mutex::new(());

    fn real_host_guard() -> std::sync::MutexGuard<'static, ()> {
        REAL_HOST_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn shell_stage(name: &str, script: &str) -> StageSpec {
        StageSpec::new(
            name,
            StageCommand::with_args("sh", vec!["-c".into(), script.into()]),
        )
    }

    fn fake_pager(dir: &tempfile::TempDir) -> OsString {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("fake-pager");
        std::fs::write(&path, "#!/bin/sh\ncat >/dev/null\nexit 0\n").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path.into_os_string()
    }

    #[test]
    fn test_real_exit_code_flows_through() {
        let _guard = real_host_guard();

        let mut left = shell_stage("left", "exit 3");
        left.stdout = OutputBinding::Channel(0);
        let mut right = shell_stage("right", "cat >/dev/null");
        right.stdin = InputBinding::Channel(0);

        let plan = PipelinePlan {
            stages: vec![left, right],
            channel_count: 1,
        };
        let pipeline = Pipeline::prepare(plan).unwrap();
        let outcome = Supervisor::new(OsProcessHost::new()).run(pipeline).unwrap();

        assert_eq!(outcome.exit_code(), 3);
        assert_eq!(outcome.terminations.len(), 2);
    }

    #[test]
    fn test_real_signal_termination() {
        let _guard = real_host_guard();

        let plan = PipelinePlan {
            stages: vec![shell_stage("doomed", "kill -TERM $$")],
            channel_count: 0,
        };
        let pipeline = Pipeline::prepare(plan).unwrap();
        let outcome = Supervisor::new(OsProcessHost::new()).run(pipeline).unwrap();

        assert_eq!(outcome.exit_code(), crate::status::SIGNAL_EXIT_CODE);
    }

    #[test]
    fn test_real_dump_sort_page_pipeline() {
        let _guard = real_host_guard();
        let dir = tempfile::tempdir().unwrap();

        let pipeline = prepared(PipelineBuilder::new().with_pager_override(fake_pager(&dir)));
        let outcome = Supervisor::new(OsProcessHost::new()).run(pipeline).unwrap();

        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(outcome.terminations.len(), 3);
    }

    #[test]
    fn test_real_filtered_pipeline_with_matches() {
        let _guard = real_host_guard();
        let dir = tempfile::tempdir().unwrap();

        // Every environment line contains '=', so the filter always matches.
        let pipeline = prepared(
            PipelineBuilder::new()
                .with_filter_tokens(vec!["=".into()])
                .with_pager_override(fake_pager(&dir)),
        );
        let outcome = Supervisor::new(OsProcessHost::new()).run(pipeline).unwrap();

        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(outcome.terminations.len(), 4);
    }

    #[test]
    fn test_real_filter_without_matches_exits_one() {
        let _guard = real_host_guard();
        let dir = tempfile::tempdir().unwrap();

        let pipeline = prepared(
            PipelineBuilder::new()
                .with_filter_tokens(vec!["no-variable-matches-this-a8f2".into()])
                .with_pager_override(fake_pager(&dir)),
        );
        let outcome = Supervisor::new(OsProcessHost::new()).run(pipeline).unwrap();

        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(outcome.terminations.len(), 4);
    }
}
