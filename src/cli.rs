use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;

use crate::device::{DeviceHandle, HandleError};

#[derive(Debug, Parser)]
#[command(
    name = "ptyserial",
    version,
    about = "Attach a pseudo-terminal to a USB-UART device",
    after_help = "Typical use on Termux:\n  termux-usb -e 'ptyserial <command> [command arguments]' <usb device address>"
)]
pub struct Cli {
    /// Config file (defaults to ~/.config/ptyserial/config.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log filter, overrides the config file (RUST_LOG still wins)
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,

    /// Command to run inside the pty, followed by the USB device handle
    #[arg(
        value_name = "COMMAND... DEVICE",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        allow_negative_numbers = true
    )]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CliError {
    #[error("missing USB device handle argument")]
    MissingDevice,

    #[error(transparent)]
    Handle(#[from] HandleError),
}

/// What to run and which device to bridge it to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Child command line, device handle already stripped. May be empty.
    pub command: Vec<String>,
    pub device: DeviceHandle,
}

impl Invocation {
    /// Split `[command [args...]] <device-handle>`; the last word is always
    /// the device handle.
    pub fn from_args(args: &[String]) -> Result<Self, CliError> {
        let (device, command) = args.split_last().ok_or(CliError::MissingDevice)?;
        Ok(Self {
            command: command.to_vec(),
            device: device.parse()?,
        })
    }
}

impl Cli {
    pub fn invocation(&self) -> Result<Invocation, CliError> {
        Invocation::from_args(&self.args)
    }
}
