use std::fmt;
use std::os::fd::RawFd;

/// One duplex data path between the pty master and the device.
///
/// Both ends normally refer to the same descriptor (the pty master). The
/// descriptors are borrowed: closing them is the owner's job, never the
/// channel's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Channel {
    pub read_fd: RawFd,
    pub write_fd: RawFd,
}

impl Channel {
    /// Sentinel for "not attached".
    pub const BAD: Channel = Channel {
        read_fd: -1,
        write_fd: -1,
    };

    pub fn new(read_fd: RawFd, write_fd: RawFd) -> Self {
        Self { read_fd, write_fd }
    }

    /// Channel whose both ends are the same duplex descriptor.
    pub fn duplex(fd: RawFd) -> Self {
        Self::new(fd, fd)
    }

    pub fn is_bad(&self) -> bool {
        self.read_fd < 0 || self.write_fd < 0
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::BAD
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{r:{}, w:{}}}", self.read_fd, self.write_fd)
    }
}
