use std::fmt;
use std::num::IntErrorKind;
use std::os::fd::RawFd;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while validating the device handle argument.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandleError {
    #[error("Invalid USB file descriptor argument {0}. Not a number.")]
    NotANumber(String),

    #[error("USB file descriptor argument {0} out of range.")]
    OutOfRange(String),

    #[error("Invalid USB file descriptor value parsed: {0} (must be non-negative).")]
    Negative(i64),
}

/// Opaque identifier of the physical USB device, usually a file descriptor
/// inherited from whoever granted access to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(RawFd);

impl DeviceHandle {
    pub fn new(fd: RawFd) -> Result<Self, HandleError> {
        if fd < 0 {
            return Err(HandleError::Negative(i64::from(fd)));
        }
        Ok(Self(fd))
    }

    pub fn as_raw_fd(self) -> RawFd {
        self.0
    }
}

impl FromStr for DeviceHandle {
    type Err = HandleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: i64 = s.trim().parse().map_err(|err: std::num::ParseIntError| {
            match err.kind() {
                IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
                    HandleError::OutOfRange(s.to_string())
                }
                _ => HandleError::NotANumber(s.to_string()),
            }
        })?;
        let fd = RawFd::try_from(value).map_err(|_| HandleError::OutOfRange(s.to_string()))?;
        DeviceHandle::new(fd)
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
