//! The supervising loop bridging one pty channel to one device.
//!
//! A session walks `Attaching → Running → Draining → Closed`, or stops at
//! `Aborted` when the device refuses the channel. Everything runs on the
//! calling thread; the only asynchronous input is the termination flag.

mod policy;

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::channel::Channel;
use crate::config::Config;
use crate::device::{
    is_fully_healthy, is_usable, DeviceContext, DeviceHandle, LineConfig, ResultCode, Status,
};
use crate::pty::Terminal;
use crate::shutdown::ShutdownSignal;

pub use policy::{PollTimeout, RetryBudget};

/// Device sub-channel every session binds to. One channel per process.
pub const SUB_CHANNEL: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Attaching,
    Running,
    Draining,
    Closed,
    Aborted,
}

/// What ended the `Running` phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// SIGINT or SIGQUIT arrived.
    Interrupted,
    /// The pump reported an error more severe than "no channel".
    PumpFailed(ResultCode),
    /// The device status stopped being usable in either direction.
    Unusable(Status),
    /// The child process terminated.
    ChildExited,
    /// Too many soft faults.
    RetriesExhausted,
}

/// Tunables of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub retry_budget: u32,
    pub backoff: Duration,
    pub drain_timeout: Duration,
    pub line: LineConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            retry_budget: 10,
            backoff: Duration::from_millis(100),
            drain_timeout: Duration::from_millis(1000),
            line: LineConfig::default(),
        }
    }
}

impl From<&Config> for SupervisorConfig {
    fn from(config: &Config) -> Self {
        Self {
            retry_budget: config.session.retry_budget,
            backoff: config.session.backoff(),
            drain_timeout: config.session.drain_timeout(),
            line: config.line,
        }
    }
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Error {} attaching fd {device}", errno(.code))]
    Attach {
        device: DeviceHandle,
        code: ResultCode,
    },
}

fn errno(code: &ResultCode) -> i32 {
    -code.raw()
}

impl SupervisorError {
    /// Process exit status for this failure: the negated device result.
    pub fn exit_code(&self) -> i32 {
        match self {
            SupervisorError::Attach { code, .. } => errno(code),
        }
    }
}

/// Outcome of a session that got past attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub reason: ExitReason,
    /// `OK` after a clean drain, the severe drain result otherwise.
    pub result: ResultCode,
    /// Pump calls made while `Running`.
    pub iterations: u64,
    pub soft_faults: u32,
    pub retries_left: i64,
    pub last_status: Status,
    /// Poll timeout in effect when `Running` ended.
    pub poll_timeout: Duration,
}

impl SessionReport {
    pub fn exit_code(&self) -> i32 {
        self.result.raw()
    }
}

/// Loop-local state of the `Running` phase.
struct RunState {
    budget: RetryBudget,
    timeout: PollTimeout,
    iterations: u64,
    soft_faults: u32,
    last_result: ResultCode,
    last_status: Status,
}

pub struct Supervisor<D, T> {
    device: D,
    terminal: T,
    config: SupervisorConfig,
    shutdown: ShutdownSignal,
    intercept_signals: bool,
    phase: SessionPhase,
}

impl<D: DeviceContext, T: Terminal> Supervisor<D, T> {
    pub fn new(device: D, terminal: T, config: SupervisorConfig) -> Self {
        Self {
            device,
            terminal,
            config,
            shutdown: ShutdownSignal::new(),
            intercept_signals: true,
            phase: SessionPhase::Idle,
        }
    }

    /// Leave SIGINT/SIGQUIT alone. The session then only ends on device,
    /// child or retry conditions.
    pub fn without_signal_handlers(mut self) -> Self {
        self.intercept_signals = false;
        self
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn terminal(&self) -> &T {
        &self.terminal
    }

    /// Run one session end to end against the device behind `device`.
    pub fn run(&mut self, device: DeviceHandle) -> Result<SessionReport, SupervisorError> {
        self.advance(SessionPhase::Attaching);
        let channel = self.terminal.channel();
        let code = self
            .device
            .attach(device, SUB_CHANNEL, channel, &self.config.line);
        if !code.is_ok() {
            let err = SupervisorError::Attach { device, code };
            error!("{}", err);
            self.terminal.kill_child();
            self.terminal.close();
            self.advance(SessionPhase::Aborted);
            return Err(err);
        }

        if self.intercept_signals {
            if let Err(err) = self.shutdown.install() {
                warn!("could not intercept termination signals: {}", err);
            }
        }

        self.advance(SessionPhase::Running);
        let mut state = RunState {
            budget: RetryBudget::new(self.config.retry_budget),
            timeout: PollTimeout::new(self.config.backoff),
            iterations: 0,
            soft_faults: 0,
            last_result: ResultCode::OK,
            last_status: Status::empty(),
        };
        let reason = self.run_loop(channel, &mut state);
        debug!(?reason, iterations = state.iterations, "leaving running phase");

        self.advance(SessionPhase::Draining);
        let result = self.drain(channel, &state);

        self.shutdown.restore();
        self.advance(SessionPhase::Closed);

        Ok(SessionReport {
            reason,
            result,
            iterations: state.iterations,
            soft_faults: state.soft_faults,
            retries_left: state.budget.remaining(),
            last_status: state.last_status,
            poll_timeout: state.timeout.current(),
        })
    }

    fn run_loop(&mut self, channel: Channel, state: &mut RunState) -> ExitReason {
        loop {
            let res = self.device.pump(state.timeout.current());
            state.iterations += 1;
            state.last_result = res;

            if self.shutdown.is_requested() {
                info!("termination requested");
                return ExitReason::Interrupted;
            }
            if res.is_fatal() {
                return ExitReason::PumpFailed(res);
            }

            let status = self.device.status(channel);
            state.last_status = status;
            if !is_usable(status) {
                warn!("Device unusable. Status={}.", status);
                return ExitReason::Unusable(status);
            }

            if self.terminal.child_exited() {
                info!("Process ended: closing.");
                return ExitReason::ChildExited;
            }

            if res.is_no_channel() || !is_fully_healthy(status) {
                if state.timeout.back_off() {
                    debug!("poll timeout raised to {:?}", state.timeout.current());
                }
                warn!("Channel error:{}. Status={}.", res, status);
                state.soft_faults += 1;
                if state.budget.consume() {
                    warn!("giving up after {} channel errors", state.soft_faults);
                    return ExitReason::RetriesExhausted;
                }
            }
        }
    }

    fn drain(&mut self, channel: Channel, state: &RunState) -> ResultCode {
        self.terminal.kill_child();
        info!("USB status {} res {}", state.last_status, state.last_result);

        self.device.close(channel);
        let res = self.device.pump(self.config.drain_timeout);
        let result = if res.is_fatal() {
            error!("Terminated with error {}", errno(&res));
            res
        } else {
            ResultCode::OK
        };

        self.terminal.close();
        result
    }

    fn advance(&mut self, phase: SessionPhase) {
        self.phase = phase;
        debug!("Session phase: {:?}", phase);
    }
}
