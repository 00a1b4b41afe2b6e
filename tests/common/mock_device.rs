//! Scripted device context for driving the supervisor without hardware.

#![allow(dead_code)]

use parking_lot::Mutex;
use ptyserial::channel::Channel;
use ptyserial::device::{DeviceContext, DeviceHandle, LineConfig, ResultCode, Status};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use super::{Event, EventLog};

struct DeviceScript {
    attach_result: ResultCode,
    pump_results: VecDeque<ResultCode>,
    default_pump: ResultCode,
    statuses: VecDeque<Status>,
    default_status: Status,
    drain_result: ResultCode,
    attached: bool,
}

/// A [`DeviceContext`] replaying scripted pump results and statuses.
///
/// Once the scripted queues run dry the defaults repeat. After `close`, pump
/// returns the drain result.
#[derive(Clone)]
pub struct MockDevice {
    script: Arc<Mutex<DeviceScript>>,
    log: EventLog,
}

impl MockDevice {
    /// Healthy device: attach succeeds, pump returns OK, status is full health.
    pub fn new(log: EventLog) -> Self {
        Self {
            script: Arc::new(Mutex::new(DeviceScript {
                attach_result: ResultCode::OK,
                pump_results: VecDeque::new(),
                default_pump: ResultCode::OK,
                statuses: VecDeque::new(),
                default_status: Status::ALLES_GUTE,
                drain_result: ResultCode::NO_CHANNEL,
                attached: false,
            })),
            log,
        }
    }

    pub fn attach_result(self, code: ResultCode) -> Self {
        self.script.lock().attach_result = code;
        self
    }

    pub fn pump_results(self, results: impl IntoIterator<Item = ResultCode>) -> Self {
        self.script.lock().pump_results.extend(results);
        self
    }

    pub fn default_pump(self, code: ResultCode) -> Self {
        self.script.lock().default_pump = code;
        self
    }

    pub fn statuses(self, statuses: impl IntoIterator<Item = Status>) -> Self {
        self.script.lock().statuses.extend(statuses);
        self
    }

    pub fn default_status(self, status: Status) -> Self {
        self.script.lock().default_status = status;
        self
    }

    pub fn drain_result(self, code: ResultCode) -> Self {
        self.script.lock().drain_result = code;
        self
    }

    pub fn is_attached(&self) -> bool {
        self.script.lock().attached
    }
}

impl DeviceContext for MockDevice {
    fn attach(
        &mut self,
        device: DeviceHandle,
        interface: u8,
        channel: Channel,
        line: &LineConfig,
    ) -> ResultCode {
        self.log.lock().push(Event::Attach {
            device: device.as_raw_fd(),
            interface,
            channel,
            line: line.to_string(),
        });
        let mut script = self.script.lock();
        script.attached = script.attach_result.is_ok();
        script.attach_result
    }

    fn pump(&mut self, timeout: Duration) -> ResultCode {
        self.log.lock().push(Event::Pump(timeout));
        let mut script = self.script.lock();
        if !script.attached {
            return script.drain_result;
        }
        let fallback = script.default_pump;
        script.pump_results.pop_front().unwrap_or(fallback)
    }

    fn status(&self, channel: Channel) -> Status {
        self.log.lock().push(Event::Status(channel));
        let mut script = self.script.lock();
        let fallback = script.default_status;
        script.statuses.pop_front().unwrap_or(fallback)
    }

    fn close(&mut self, channel: Channel) {
        self.log.lock().push(Event::Close(channel));
        self.script.lock().attached = false;
    }
}
