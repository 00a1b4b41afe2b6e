use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Composite health of one attached channel.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Status: u32 {
        const USB_DEV_OK = 1 << 0;
        const READ_PIPE_OK = 1 << 1;
        const WRITE_PIPE_OK = 1 << 2;
        const ALLES_GUTE = Self::USB_DEV_OK.bits()
            | Self::READ_PIPE_OK.bits()
            | Self::WRITE_PIPE_OK.bits();
    }
}

impl Status {
    /// Device present with only the read direction working.
    pub const READ_ONLY: Status = Status::USB_DEV_OK.union(Status::READ_PIPE_OK);
    /// Device present with only the write direction working.
    pub const WRITE_ONLY: Status = Status::USB_DEV_OK.union(Status::WRITE_PIPE_OK);
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// True only when every flag is set.
pub fn is_fully_healthy(status: Status) -> bool {
    status == Status::ALLES_GUTE
}

/// True when the channel can keep running, possibly in one direction only.
///
/// Matches exact combinations: a device with both pipes down, or no device
/// at all, is not usable even though some bits may be set.
pub fn is_usable(status: Status) -> bool {
    status == Status::ALLES_GUTE || status == Status::READ_ONLY || status == Status::WRITE_ONLY
}
