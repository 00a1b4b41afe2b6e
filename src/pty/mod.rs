mod command;
mod session;
mod size;

use thiserror::Error;

use crate::channel::Channel;

pub use command::{build_command, describe_command};
pub use session::PtySession;

/// Errors raised while setting up the pseudo-terminal.
#[derive(Debug, Error)]
pub enum PtyError {
    #[error("Could not create pty: {0:#}")]
    Allocate(anyhow::Error),

    #[error("Could not start '{command}': {reason:#}")]
    Spawn {
        command: String,
        reason: anyhow::Error,
    },

    #[error("pty master exposes no file descriptor")]
    NoMasterFd,
}

/// The terminal side of a session: a pty master used as the data channel and
/// the child process attached to its slave.
pub trait Terminal {
    /// Channel over the master descriptor; [`Channel::BAD`] once closed.
    fn channel(&self) -> Channel;

    /// Non-blocking check whether the child has terminated.
    fn child_exited(&mut self) -> bool;

    /// Forcefully stop the child (SIGKILL, no grace period).
    fn kill_child(&mut self);

    /// Close the master descriptor. Idempotent.
    fn close(&mut self);
}
