//! Top-level error type and process exit codes.

use thiserror::Error;

use crate::cli::CliError;
use crate::config::ConfigError;
use crate::device::HandleError;
use crate::pty::PtyError;
use crate::supervisor::SupervisorError;

/// Distinct exit statuses for failures before the session starts.
///
/// Attach failures exit with the negated device result instead, and clap
/// usage errors keep clap's own status 2.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const INVALID_HANDLE: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NEGATIVE_HANDLE: i32 = 3;
    pub const PTY_FAILED: i32 = 4;
    pub const SPAWN_FAILED: i32 = 5;
    pub const CONFIG_FAILED: i32 = 6;
    pub const USB_INIT_FAILED: i32 = 7;
}

/// Errors that end the process.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Cli(#[from] CliError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pty(#[from] PtyError),

    #[error("Could not initialise USB: {0}")]
    Usb(#[from] rusb::Error),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

impl AppError {
    /// Map error variant to the process exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Cli(CliError::MissingDevice) => exit_code::USAGE,
            AppError::Cli(CliError::Handle(HandleError::Negative(_))) => {
                exit_code::NEGATIVE_HANDLE
            }
            AppError::Cli(CliError::Handle(_)) => exit_code::INVALID_HANDLE,
            AppError::Config(_) => exit_code::CONFIG_FAILED,
            AppError::Pty(PtyError::Spawn { .. }) => exit_code::SPAWN_FAILED,
            AppError::Pty(_) => exit_code::PTY_FAILED,
            AppError::Usb(_) => exit_code::USB_INIT_FAILED,
            AppError::Supervisor(err) => err.exit_code(),
        }
    }

    /// Whether the failure was already logged where it happened.
    pub fn is_reported(&self) -> bool {
        matches!(self, AppError::Supervisor(_))
    }
}
