//! Device-side contract consumed by the supervisor.
//!
//! The supervisor only ever talks to a device through [`DeviceContext`]; it
//! never inspects error codes beyond the no-channel severity threshold and
//! never looks at status bits beyond the classifiers in [`status`].

mod handle;
mod line;
pub mod status;
pub mod usb;

use std::fmt;
use std::time::Duration;

use crate::channel::Channel;

pub use handle::{DeviceHandle, HandleError};
pub use line::{DataBits, LineConfig, Parity, StopBits};
pub use status::{is_fully_healthy, is_usable, Status};

/// Device error classes, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    NoChannel = 1,
    NoDevice = 2,
    NoInterface = 3,
    NoAccess = 4,
    NotSupported = 5,
    InvalidParam = 6,
    AlreadyAttached = 7,
    Busy = 8,
    Pipe = 9,
    Io = 10,
    Usb = 11,
}

/// Result of a device operation: `0` on success, `-ErrorCode` on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultCode(i32);

impl ResultCode {
    pub const OK: ResultCode = ResultCode(0);

    /// The soft "no channel currently active" result. Anything numerically
    /// below it is fatal; it and everything above it are soft.
    pub const NO_CHANNEL: ResultCode = ResultCode::error(ErrorCode::NoChannel);

    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn error(code: ErrorCode) -> Self {
        Self(-(code as i32))
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    pub fn is_ok(self) -> bool {
        self.0 == 0
    }

    pub fn is_no_channel(self) -> bool {
        self == Self::NO_CHANNEL
    }

    pub fn is_fatal(self) -> bool {
        self.0 < Self::NO_CHANNEL.0
    }
}

impl From<ErrorCode> for ResultCode {
    fn from(code: ErrorCode) -> Self {
        ResultCode::error(code)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A USB-UART device driver able to bridge one [`Channel`].
pub trait DeviceContext {
    /// Bind `channel` to `interface` of the device behind `device`, applying
    /// `line`. A non-OK result means nothing was attached.
    fn attach(
        &mut self,
        device: DeviceHandle,
        interface: u8,
        channel: Channel,
        line: &LineConfig,
    ) -> ResultCode;

    /// Advance device I/O, blocking at most `timeout`.
    fn pump(&mut self, timeout: Duration) -> ResultCode;

    /// Current health of `channel`.
    fn status(&self, channel: Channel) -> Status;

    /// Detach `channel` and release its device-side resources. Idempotent.
    fn close(&mut self, channel: Channel);
}

impl<D: DeviceContext + ?Sized> DeviceContext for Box<D> {
    fn attach(
        &mut self,
        device: DeviceHandle,
        interface: u8,
        channel: Channel,
        line: &LineConfig,
    ) -> ResultCode {
        (**self).attach(device, interface, channel, line)
    }

    fn pump(&mut self, timeout: Duration) -> ResultCode {
        (**self).pump(timeout)
    }

    fn status(&self, channel: Channel) -> Status {
        (**self).status(channel)
    }

    fn close(&mut self, channel: Channel) {
        (**self).close(channel)
    }
}
