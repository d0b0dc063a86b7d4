//! Inter-stage byte channels backed by OS pipes.

use crate::errors::SetupError;
use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use std::os::fd::OwnedFd;

/// One pipe connecting two adjacent stages.
///
/// Both endpoints are created close-on-exec, so a spawned stage can only ever
/// see the endpoint explicitly rewired onto its stdio. Each endpoint moves
/// out of the channel at most once; whatever is still held is closed by
/// [`Channel::close`] or on drop. A reader blocks forever if some process
/// keeps a stray write endpoint open, so every endpoint must end up owned by
/// exactly one of writer stage, reader stage, or supervisor — and ownership
/// of `OwnedFd` values is how that is enforced.
#[derive(Debug)]
pub struct Channel {
    reader: Option<OwnedFd>,
    writer: Option<OwnedFd>,
}

impl Channel {
    /// Opens a fresh channel. `index` is only used to label the error.
    pub fn open(index: usize) -> Result<Self, SetupError> {
        let (reader, writer) =
            pipe2(OFlag::O_CLOEXEC).map_err(|errno| SetupError::channel_create(index, errno.into()))?;
        Ok(Self {
            reader: Some(reader),
            writer: Some(writer),
        })
    }

    /// Moves the read endpoint out; `None` once taken or closed.
    pub fn take_reader(&mut self) -> Option<OwnedFd> {
        self.reader.take()
    }

    /// Moves the write endpoint out; `None` once taken or closed.
    pub fn take_writer(&mut self) -> Option<OwnedFd> {
        self.writer.take()
    }

    /// Closes whatever endpoints are still held here.
    pub fn close(&mut self) {
        self.reader = None;
        self.writer = None;
    }

    /// True when neither endpoint is held here any more.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.reader.is_none() && self.writer.is_none()
    }
}
