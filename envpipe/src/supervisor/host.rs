//! The process-host seam between the supervisor and the OS.
//!
//! Everything the supervisor asks of the operating system — start a child
//! with rewired stdio, tell me which child terminated next — goes through
//! [`ProcessHost`], so the launch and reduction logic can be exercised in
//! tests without creating a single process.

use crate::stages::StageCommand;
use crate::status::ExitStatus;
use nix::sys::wait::{wait, WaitStatus};
use std::io;
use std::os::fd::OwnedFd;
use std::process::{Command, Stdio};

/// Identity of a spawned child as reported by the host.
pub type ChildId = i32;

/// What a stage's stdin or stdout is wired to at spawn time.
#[derive(Debug)]
pub enum Redirect {
    /// Keep the supervisor's own descriptor.
    Inherit,
    /// Rewire onto this channel endpoint. The endpoint moves into the child;
    /// the supervisor's copy is gone once the spawn call returns.
    Endpoint(OwnedFd),
}

impl Redirect {
    /// Duplicates the redirect so one spawn attempt can consume it while a
    /// later fallback attempt still has the original.
    pub fn try_clone(&self) -> io::Result<Self> {
        match self {
            Self::Inherit => Ok(Self::Inherit),
            Self::Endpoint(fd) => Ok(Self::Endpoint(fd.try_clone()?)),
        }
    }

    fn into_stdio(self) -> Stdio {
        match self {
            Self::Inherit => Stdio::inherit(),
            Self::Endpoint(fd) => Stdio::from(fd),
        }
    }
}

/// Spawning and reaping, abstracted over the OS.
pub trait ProcessHost {
    /// Starts `command` with the given stdio wiring and returns the child's
    /// identity. After the call the child holds no channel endpoint beyond
    /// the ones rewired onto its stdio, and the caller holds none of the
    /// endpoints passed in.
    fn spawn(
        &mut self,
        command: &StageCommand,
        stdin: Redirect,
        stdout: Redirect,
    ) -> io::Result<ChildId>;

    /// Blocks until any remaining child terminates, in arrival order, and
    /// reports which one and how.
    fn wait_any(&mut self) -> io::Result<(ChildId, ExitStatus)>;
}

/// Production host: real child processes, reaped in arrival order.
#[derive(Debug, Default)]
pub struct OsProcessHost;

impl OsProcessHost {
    /// Creates a host.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ProcessHost for OsProcessHost {
    fn spawn(
        &mut self,
        command: &StageCommand,
        stdin: Redirect,
        stdout: Redirect,
    ) -> io::Result<ChildId> {
        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(stdin.into_stdio())
            .stdout(stdout.into_stdio())
            .spawn()?;
        // Reaped through `wait_any`, never through this handle.
        Ok(child.id() as ChildId)
    }

    fn wait_any(&mut self) -> io::Result<(ChildId, ExitStatus)> {
        loop {
            match wait().map_err(io::Error::from)? {
                WaitStatus::Exited(pid, code) => {
                    return Ok((pid.as_raw(), ExitStatus::Exited(code)));
                }
                WaitStatus::Signaled(pid, signal, _) => {
                    return Ok((pid.as_raw(), ExitStatus::Signaled(signal as i32)));
                }
                // Only terminations are requested; anything else is spurious.
                _ => {}
            }
        }
    }
}
