use portable_pty::{native_pty_system, Child, MasterPty};
use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::pty::command::{build_command, describe_command};
use crate::pty::size::initial_size;
use crate::pty::{PtyError, Terminal};

/// A child process running on the slave side of a fresh pty, with the
/// master kept by us as the data channel.
pub struct PtySession {
    master: Option<Box<dyn MasterPty + Send>>,
    child: Box<dyn Child + Send + Sync>,
    channel: Channel,
    exited: bool,
}

impl PtySession {
    /// Allocate a pty pair and start `command` on its slave side.
    ///
    /// An empty `command` starts a placeholder child that exits at once.
    pub fn spawn(command: &[String]) -> Result<Self, PtyError> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(initial_size())
            .map_err(PtyError::Allocate)?;

        let cmd = build_command(command);
        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|reason| PtyError::Spawn {
                command: describe_command(command),
                reason,
            })?;
        drop(pair.slave);

        let master = pair.master;
        let Some(fd) = master.as_raw_fd() else {
            let _ = child.kill();
            return Err(PtyError::NoMasterFd);
        };
        match master.tty_name() {
            Some(name) => info!("PTY created: {}", name.display()),
            None => info!("PTY created: fd {}", fd),
        }
        debug!(
            pid = child.process_id(),
            "spawned '{}'",
            describe_command(command)
        );

        Ok(Self {
            master: Some(master),
            child,
            channel: Channel::duplex(fd),
            exited: false,
        })
    }
}

impl Terminal for PtySession {
    fn channel(&self) -> Channel {
        if self.master.is_some() {
            self.channel
        } else {
            Channel::BAD
        }
    }

    fn child_exited(&mut self) -> bool {
        if self.exited {
            return true;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!("child exited: {:?}", status);
                self.exited = true;
            }
            Ok(None) => {}
            Err(err) => {
                warn!("failed to query child state: {}", err);
                self.exited = true;
            }
        }
        self.exited
    }

    fn kill_child(&mut self) {
        if self.exited {
            return;
        }
        match self.child.process_id().and_then(|pid| libc::pid_t::try_from(pid).ok()) {
            // Safety: plain kill(2) on the pid we spawned.
            Some(pid) => unsafe {
                libc::kill(pid, libc::SIGKILL);
            },
            None => {
                let _ = self.child.kill();
            }
        }
        // Reap without blocking; a straggler is collected at process exit.
        if let Ok(Some(_)) = self.child.try_wait() {
            self.exited = true;
        }
    }

    fn close(&mut self) {
        if self.master.take().is_some() {
            debug!("pty master closed");
        }
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        self.close();
    }
}
