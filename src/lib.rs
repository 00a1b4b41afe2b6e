//! Bridge a USB-UART device to a freshly spawned pseudo-terminal.

pub mod bridge;
pub mod channel;
pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod pty;
pub mod shutdown;
pub mod supervisor;
