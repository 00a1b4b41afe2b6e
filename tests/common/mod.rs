//! Shared test utilities and mock infrastructure.

#![allow(dead_code, unused_imports)]

pub mod mock_device;
pub mod mock_terminal;

use parking_lot::Mutex;
use ptyserial::channel::Channel;
use ptyserial::device::{DeviceHandle, ResultCode, Status};
use ptyserial::supervisor::{Supervisor, SupervisorConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub use mock_device::MockDevice;
pub use mock_terminal::MockTerminal;

/// Channel the mock terminal hands out.
pub const TEST_CHANNEL: Channel = Channel {
    read_fd: 42,
    write_fd: 42,
};

/// Everything the supervisor did to its collaborators, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Attach {
        device: i32,
        interface: u8,
        channel: Channel,
        line: String,
    },
    Pump(Duration),
    Status(Channel),
    Close(Channel),
    ChildCheck,
    Kill,
    CloseMaster,
}

pub type EventLog = Arc<Mutex<Vec<Event>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn device_handle(fd: i32) -> DeviceHandle {
    DeviceHandle::new(fd).expect("valid test handle")
}

/// Supervisor over the given mocks with default tunables and no real
/// signal handlers.
pub fn supervisor(device: MockDevice, terminal: MockTerminal) -> Supervisor<MockDevice, MockTerminal> {
    Supervisor::new(device, terminal, SupervisorConfig::default()).without_signal_handlers()
}

/// Timeouts passed to pump while the session was running (the drain pump
/// after `Close` excluded).
pub fn running_pump_timeouts(events: &[Event]) -> Vec<Duration> {
    events
        .iter()
        .take_while(|event| !matches!(event, Event::Close(_)))
        .filter_map(|event| match event {
            Event::Pump(timeout) => Some(*timeout),
            _ => None,
        })
        .collect()
}

pub fn count(events: &[Event], wanted: fn(&Event) -> bool) -> usize {
    events.iter().filter(|event| wanted(event)).count()
}

/// Create a temporary config file with the given TOML content.
pub fn temp_config(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, content).expect("Failed to write config");
    (temp_dir, config_path)
}

pub fn degraded_statuses(len: usize) -> Vec<Status> {
    [Status::READ_ONLY, Status::WRITE_ONLY]
        .into_iter()
        .cycle()
        .take(len)
        .collect()
}

pub fn no_channel_results(len: usize) -> Vec<ResultCode> {
    vec![ResultCode::NO_CHANNEL; len]
}
