use tracing::{debug, info};

use crate::cli::Invocation;
use crate::config::Config;
use crate::device::usb::UsbUartContext;
use crate::error::AppError;
use crate::pty::{PtySession, Terminal};
use crate::supervisor::{SessionReport, Supervisor, SupervisorConfig};

/// Spawn the terminal, open the USB context and supervise the bridge until
/// it drains.
pub fn run(invocation: &Invocation, config: &Config) -> Result<SessionReport, AppError> {
    let mut terminal = PtySession::spawn(&invocation.command)?;

    let device = match UsbUartContext::new() {
        Ok(device) => device,
        Err(err) => {
            terminal.kill_child();
            return Err(err.into());
        }
    };

    let settings = SupervisorConfig::from(config);
    debug!(line = %settings.line, retry_budget = settings.retry_budget, "starting session");
    let mut supervisor = Supervisor::new(device, terminal, settings);
    let report = supervisor.run(invocation.device)?;

    info!(
        reason = ?report.reason,
        iterations = report.iterations,
        soft_faults = report.soft_faults,
        "session closed with result {}",
        report.result
    );
    Ok(report)
}
