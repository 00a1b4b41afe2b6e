#![allow(dead_code)]

use parking_lot::Mutex;
use ptyserial::channel::Channel;
use ptyserial::pty::Terminal;
use std::sync::Arc;

use super::{Event, EventLog, TEST_CHANNEL};

struct TerminalState {
    /// Liveness checks answered "still running" before the child exits.
    alive_checks: Option<usize>,
    checks: usize,
    killed: bool,
    master_open: bool,
}

/// A [`Terminal`] whose child exits after a scripted number of checks.
#[derive(Clone)]
pub struct MockTerminal {
    state: Arc<Mutex<TerminalState>>,
    log: EventLog,
}

impl MockTerminal {
    /// Child that never exits on its own.
    pub fn new(log: EventLog) -> Self {
        Self {
            state: Arc::new(Mutex::new(TerminalState {
                alive_checks: None,
                checks: 0,
                killed: false,
                master_open: true,
            })),
            log,
        }
    }

    /// Child reported alive for `checks` liveness checks, exited afterwards.
    pub fn exits_after(self, checks: usize) -> Self {
        self.state.lock().alive_checks = Some(checks);
        self
    }

    pub fn was_killed(&self) -> bool {
        self.state.lock().killed
    }

    pub fn is_master_open(&self) -> bool {
        self.state.lock().master_open
    }
}

impl Terminal for MockTerminal {
    fn channel(&self) -> Channel {
        if self.state.lock().master_open {
            TEST_CHANNEL
        } else {
            Channel::BAD
        }
    }

    fn child_exited(&mut self) -> bool {
        self.log.lock().push(Event::ChildCheck);
        let mut state = self.state.lock();
        if state.killed {
            return true;
        }
        let exited = state.alive_checks.is_some_and(|alive| state.checks >= alive);
        state.checks += 1;
        exited
    }

    fn kill_child(&mut self) {
        self.log.lock().push(Event::Kill);
        self.state.lock().killed = true;
    }

    fn close(&mut self) {
        self.log.lock().push(Event::CloseMaster);
        self.state.lock().master_open = false;
    }
}
