use std::io;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use signal_hook::consts::signal::{SIGINT, SIGQUIT};
use signal_hook::SigId;
use tracing::debug;

/// Signals that request a session teardown.
pub const TERMINATION_SIGNALS: [libc::c_int; 2] = [SIGINT, SIGQUIT];

/// OS-level handlers parked while the default disposition is in place.
///
/// signal-hook installs its handler once per signal and never again, so a
/// later session has to put the parked handler back itself.
static PARKED: Mutex<Vec<(libc::c_int, libc::sigaction)>> = Mutex::new(Vec::new());

/// The process-wide "stop requested" flag.
///
/// The signal handler only stores `true`; the supervisor loads it once per
/// loop iteration. Nothing else touches it.
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
    registered: Vec<(libc::c_int, SigId)>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            registered: Vec::new(),
        }
    }

    /// Route SIGINT and SIGQUIT into the flag.
    pub fn install(&mut self) -> io::Result<()> {
        if !self.registered.is_empty() {
            return Ok(());
        }
        for signal in TERMINATION_SIGNALS {
            let installed = signal_hook::flag::register(signal, Arc::clone(&self.requested))
                .and_then(|id| {
                    self.registered.push((signal, id));
                    unpark(signal)
                });
            if let Err(err) = installed {
                self.restore();
                return Err(err);
            }
        }
        debug!("termination signal handlers installed");
        Ok(())
    }

    /// Put SIGINT and SIGQUIT back to their default disposition.
    pub fn restore(&mut self) {
        if self.registered.is_empty() {
            return;
        }
        for (signal, id) in self.registered.drain(..) {
            signal_hook::low_level::unregister(id);
            if let Err(err) = park(signal) {
                debug!("could not reset signal {}: {}", signal, err);
            }
        }
        debug!("termination signal handlers restored");
    }

    pub fn is_installed(&self) -> bool {
        !self.registered.is_empty()
    }

    /// Check if a termination signal arrived
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ShutdownSignal {
    fn drop(&mut self) {
        self.restore();
    }
}

fn current_action(signal: libc::c_int) -> io::Result<libc::sigaction> {
    // Safety: a zeroed sigaction is a valid out-parameter; no new action is set.
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        if libc::sigaction(signal, ptr::null(), &mut action) != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(action)
    }
}

fn set_action(signal: libc::c_int, action: &libc::sigaction) -> io::Result<()> {
    // Safety: action is either a disposition read back from the kernel or SIG_DFL.
    if unsafe { libc::sigaction(signal, action, ptr::null_mut()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Stash the installed handler of `signal` and switch it to `SIG_DFL`.
fn park(signal: libc::c_int) -> io::Result<()> {
    let installed = current_action(signal)?;
    if installed.sa_sigaction == libc::SIG_DFL {
        return Ok(());
    }
    // Safety: zeroed sigaction with SIG_DFL (0) and an empty mask is the default disposition.
    let mut default: libc::sigaction = unsafe { mem::zeroed() };
    default.sa_sigaction = libc::SIG_DFL;
    set_action(signal, &default)?;

    let mut parked = PARKED.lock();
    parked.retain(|(parked_signal, _)| *parked_signal != signal);
    parked.push((signal, installed));
    Ok(())
}

/// Reinstate a handler parked by [`park`], unless something else took the
/// signal over in the meantime.
fn unpark(signal: libc::c_int) -> io::Result<()> {
    let mut parked = PARKED.lock();
    let Some(index) = parked.iter().position(|(parked_signal, _)| *parked_signal == signal) else {
        return Ok(());
    };
    if current_action(signal)?.sa_sigaction != libc::SIG_DFL {
        parked.remove(index);
        return Ok(());
    }
    let (_, action) = parked.remove(index);
    set_action(signal, &action)
}
