//! CDC-ACM USB-UART driver on top of `rusb`.
//!
//! The device is opened from a file descriptor handed to us by the caller
//! (Termux and similar hosts grant USB access that way), so no enumeration
//! happens here. Transfers are synchronous with short timeouts; [`pump`]
//! never blocks longer than the timeout it is given plus one write slice.
//!
//! [`pump`]: UsbUartContext::pump

use rusb::{Context, Direction, Recipient, RequestType, TransferType, UsbContext};
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::channel::Channel;
use crate::device::{DeviceContext, DeviceHandle, ErrorCode, LineConfig, ResultCode, Status};

const CDC_COMM_CLASS: u8 = 0x02;
const CDC_DATA_CLASS: u8 = 0x0A;

const SET_LINE_CODING: u8 = 0x20;
const SET_CONTROL_LINE_STATE: u8 = 0x22;
const CONTROL_LINE_DTR_RTS: u16 = 0x03;

const CONTROL_TIMEOUT: Duration = Duration::from_millis(500);
const WRITE_TIMEOUT: Duration = Duration::from_millis(100);
// libusb treats a zero timeout as "wait forever".
const READ_TIMEOUT: Duration = Duration::from_millis(1);

const IO_CHUNK: usize = 4096;
const MAX_PENDING_TTY: usize = 64 * 1024;

/// Interfaces and bulk endpoints of one CDC-ACM function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Endpoints {
    control_iface: u8,
    data_iface: u8,
    bulk_in: u8,
    bulk_out: u8,
}

impl Endpoints {
    fn interfaces(&self) -> Vec<u8> {
        if self.control_iface == self.data_iface {
            vec![self.data_iface]
        } else {
            vec![self.control_iface, self.data_iface]
        }
    }
}

struct Attachment {
    handle: rusb::DeviceHandle<Context>,
    channel: Channel,
    endpoints: Endpoints,
    status: Status,
    /// Received from the device, not yet accepted by the pty.
    to_tty: Vec<u8>,
    /// Read from the pty, not yet accepted by the device.
    to_usb: Vec<u8>,
}

/// Production [`DeviceContext`] driving a single CDC-ACM channel.
pub struct UsbUartContext {
    context: Context,
    attachment: Option<Attachment>,
}

impl UsbUartContext {
    pub fn new() -> Result<Self, rusb::Error> {
        // Devices only ever arrive as descriptors; without root (Termux) usbfs
        // cannot be scanned and libusb_init fails unless discovery is off.
        if let Err(err) = rusb::disable_device_discovery() {
            debug!("device discovery left enabled: {}", err);
        }
        let context = Context::new()?;
        debug!("libusb context initialised");
        Ok(Self {
            context,
            attachment: None,
        })
    }

    fn open(
        &self,
        device: DeviceHandle,
        interface: u8,
        channel: Channel,
        line: &LineConfig,
    ) -> Result<Attachment, ErrorCode> {
        // Safety: the descriptor belongs to the caller for the whole process
        // lifetime and libusb never closes a wrapped descriptor.
        let handle = unsafe { self.context.open_device_with_fd(device.as_raw_fd()) }
            .map_err(|err| map_rusb_error("open device", err))?;

        let endpoints = find_endpoints(&handle.device(), interface)?;
        debug!(?endpoints, "found CDC-ACM function");

        if let Err(err) = handle.set_auto_detach_kernel_driver(true) {
            trace!("auto-detach of kernel driver unavailable: {}", err);
        }

        let mut claimed = Vec::new();
        for iface in endpoints.interfaces() {
            if let Err(err) = handle.claim_interface(iface) {
                for done in &claimed {
                    let _ = handle.release_interface(*done);
                }
                return Err(map_rusb_error("claim interface", err));
            }
            claimed.push(iface);
        }
        let handle = scopeguard::guard(handle, |handle| {
            for iface in &claimed {
                let _ = handle.release_interface(*iface);
            }
        });

        let request_type =
            rusb::request_type(Direction::Out, RequestType::Class, Recipient::Interface);
        let coding = line.encode_cdc();
        handle
            .write_control(
                request_type,
                SET_LINE_CODING,
                0,
                u16::from(endpoints.control_iface),
                &coding,
                CONTROL_TIMEOUT,
            )
            .map_err(|err| map_rusb_error("SET_LINE_CODING", err))?;
        handle
            .write_control(
                request_type,
                SET_CONTROL_LINE_STATE,
                CONTROL_LINE_DTR_RTS,
                u16::from(endpoints.control_iface),
                &[],
                CONTROL_TIMEOUT,
            )
            .map_err(|err| map_rusb_error("SET_CONTROL_LINE_STATE", err))?;

        set_nonblocking(channel.read_fd).map_err(|err| {
            warn!("failed to make fd {} non-blocking: {}", channel.read_fd, err);
            ErrorCode::Io
        })?;
        if channel.write_fd != channel.read_fd {
            set_nonblocking(channel.write_fd).map_err(|_| ErrorCode::Io)?;
        }

        info!(line = %line, "attached channel {} to device {}", channel, device);
        Ok(Attachment {
            handle: scopeguard::ScopeGuard::into_inner(handle),
            channel,
            endpoints,
            status: Status::ALLES_GUTE,
            to_tty: Vec::new(),
            to_usb: Vec::new(),
        })
    }
}

impl DeviceContext for UsbUartContext {
    fn attach(
        &mut self,
        device: DeviceHandle,
        interface: u8,
        channel: Channel,
        line: &LineConfig,
    ) -> ResultCode {
        if self.attachment.is_some() {
            return ErrorCode::AlreadyAttached.into();
        }
        if channel.is_bad() {
            return ErrorCode::InvalidParam.into();
        }
        match self.open(device, interface, channel, line) {
            Ok(attachment) => {
                self.attachment = Some(attachment);
                ResultCode::OK
            }
            Err(code) => ResultCode::error(code),
        }
    }

    fn pump(&mut self, timeout: Duration) -> ResultCode {
        let Some(attachment) = self.attachment.as_mut() else {
            return ResultCode::NO_CHANNEL;
        };
        match attachment.service(timeout) {
            Ok(()) => ResultCode::OK,
            Err(code) => ResultCode::error(code),
        }
    }

    fn status(&self, channel: Channel) -> Status {
        match &self.attachment {
            Some(attachment) if attachment.channel == channel => attachment.status,
            _ => Status::empty(),
        }
    }

    fn close(&mut self, channel: Channel) {
        let matches = self
            .attachment
            .as_ref()
            .is_some_and(|attachment| attachment.channel == channel);
        if !matches {
            return;
        }
        if let Some(mut attachment) = self.attachment.take() {
            attachment.release();
            debug!("closed channel {}", channel);
        }
    }
}

impl Drop for UsbUartContext {
    fn drop(&mut self) {
        if let Some(mut attachment) = self.attachment.take() {
            attachment.release();
        }
    }
}

impl Attachment {
    fn service(&mut self, timeout: Duration) -> Result<(), ErrorCode> {
        if !self.status.contains(Status::USB_DEV_OK) {
            return Err(ErrorCode::NoDevice);
        }
        self.flush_tty();

        // Backpressure: leave pty input alone until the device took the last chunk.
        if self.to_usb.is_empty() && poll_readable(self.channel.read_fd, timeout) {
            self.read_tty();
        }

        self.flush_usb()?;
        self.read_usb()?;
        self.flush_tty();
        Ok(())
    }

    fn read_tty(&mut self) {
        let mut buf = [0u8; IO_CHUNK];
        // Safety: buf is valid for writes of buf.len() bytes.
        let n = unsafe {
            libc::read(
                self.channel.read_fd,
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
            )
        };
        if n > 0 {
            self.to_usb.extend_from_slice(&buf[..n as usize]);
            return;
        }
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::WouldBlock && err.kind() != io::ErrorKind::Interrupted
            {
                // EIO once the slave side has no more holders.
                trace!("pty read: {}", err);
            }
        }
    }

    fn flush_tty(&mut self) {
        while !self.to_tty.is_empty() {
            // Safety: to_tty is valid for reads of to_tty.len() bytes.
            let n = unsafe {
                libc::write(
                    self.channel.write_fd,
                    self.to_tty.as_ptr() as *const libc::c_void,
                    self.to_tty.len(),
                )
            };
            if n > 0 {
                self.to_tty.drain(..n as usize);
                continue;
            }
            let err = io::Error::last_os_error();
            match err.kind() {
                io::ErrorKind::WouldBlock => break,
                io::ErrorKind::Interrupted => continue,
                _ => {
                    trace!("dropping {} bytes for pty: {}", self.to_tty.len(), err);
                    self.to_tty.clear();
                }
            }
        }
        if self.to_tty.len() > MAX_PENDING_TTY {
            let excess = self.to_tty.len() - MAX_PENDING_TTY;
            debug!("pty not draining, discarding {} bytes", excess);
            self.to_tty.drain(..excess);
        }
    }

    fn flush_usb(&mut self) -> Result<(), ErrorCode> {
        if self.to_usb.is_empty() {
            return Ok(());
        }
        match self
            .handle
            .write_bulk(self.endpoints.bulk_out, &self.to_usb, WRITE_TIMEOUT)
        {
            Ok(written) => {
                self.to_usb.drain(..written.min(self.to_usb.len()));
                self.status.insert(Status::WRITE_PIPE_OK);
                Ok(())
            }
            Err(rusb::Error::Timeout) => Ok(()),
            Err(err) => self.pipe_failed(self.endpoints.bulk_out, Status::WRITE_PIPE_OK, err),
        }
    }

    fn read_usb(&mut self) -> Result<(), ErrorCode> {
        let mut buf = [0u8; IO_CHUNK];
        match self
            .handle
            .read_bulk(self.endpoints.bulk_in, &mut buf, READ_TIMEOUT)
        {
            Ok(read) => {
                self.to_tty.extend_from_slice(&buf[..read]);
                self.status.insert(Status::READ_PIPE_OK);
                Ok(())
            }
            Err(rusb::Error::Timeout) | Err(rusb::Error::Interrupted) => Ok(()),
            Err(err) => self.pipe_failed(self.endpoints.bulk_in, Status::READ_PIPE_OK, err),
        }
    }

    fn pipe_failed(&mut self, endpoint: u8, bit: Status, err: rusb::Error) -> Result<(), ErrorCode> {
        if err == rusb::Error::NoDevice {
            warn!("USB device disconnected");
            self.status.remove(Status::USB_DEV_OK | bit);
            return Err(ErrorCode::NoDevice);
        }
        debug!("endpoint {:#04x} failed: {}", endpoint, err);
        self.status.remove(bit);
        if err == rusb::Error::Pipe {
            if let Err(clear) = self.handle.clear_halt(endpoint) {
                debug!("clear_halt on {:#04x}: {}", endpoint, clear);
            }
        }
        Ok(())
    }

    fn release(&mut self) {
        if !self.to_usb.is_empty() && self.status.contains(Status::WRITE_PIPE_OK) {
            let _ = self
                .handle
                .write_bulk(self.endpoints.bulk_out, &self.to_usb, WRITE_TIMEOUT);
        }
        self.to_usb.clear();
        self.flush_tty();
        for iface in self.endpoints.interfaces() {
            let _ = self.handle.release_interface(iface);
        }
    }
}

/// Locate the `ordinal`-th CDC data interface carrying a bulk IN/OUT pair,
/// plus the communication interface that controls it.
fn find_endpoints(device: &rusb::Device<Context>, ordinal: u8) -> Result<Endpoints, ErrorCode> {
    let config = device
        .active_config_descriptor()
        .map_err(|err| map_rusb_error("read config descriptor", err))?;

    let mut comm_ifaces = Vec::new();
    let mut data_functions = Vec::new();
    for interface in config.interfaces() {
        for descriptor in interface.descriptors() {
            match descriptor.class_code() {
                CDC_COMM_CLASS => comm_ifaces.push(descriptor.interface_number()),
                CDC_DATA_CLASS => {
                    let mut bulk_in = None;
                    let mut bulk_out = None;
                    for endpoint in descriptor.endpoint_descriptors() {
                        if endpoint.transfer_type() != TransferType::Bulk {
                            continue;
                        }
                        match endpoint.direction() {
                            Direction::In => bulk_in = bulk_in.or(Some(endpoint.address())),
                            Direction::Out => bulk_out = bulk_out.or(Some(endpoint.address())),
                        }
                    }
                    if let (Some(bulk_in), Some(bulk_out)) = (bulk_in, bulk_out) {
                        data_functions.push((descriptor.interface_number(), bulk_in, bulk_out));
                        break;
                    }
                }
                _ => {}
            }
        }
    }

    let (data_iface, bulk_in, bulk_out) = data_functions
        .get(usize::from(ordinal))
        .copied()
        .ok_or(ErrorCode::NoInterface)?;
    // Composite devices put the control interface right before its data one.
    let control_iface = comm_ifaces
        .iter()
        .copied()
        .find(|iface| iface.checked_add(1) == Some(data_iface))
        .or_else(|| comm_ifaces.first().copied())
        .unwrap_or(data_iface);

    Ok(Endpoints {
        control_iface,
        data_iface,
        bulk_in,
        bulk_out,
    })
}

fn map_rusb_error(op: &str, err: rusb::Error) -> ErrorCode {
    let code = match err {
        rusb::Error::NoDevice => ErrorCode::NoDevice,
        rusb::Error::NotFound => ErrorCode::NoInterface,
        rusb::Error::Access => ErrorCode::NoAccess,
        rusb::Error::NotSupported => ErrorCode::NotSupported,
        rusb::Error::InvalidParam => ErrorCode::InvalidParam,
        rusb::Error::Busy => ErrorCode::Busy,
        rusb::Error::Pipe => ErrorCode::Pipe,
        rusb::Error::Io => ErrorCode::Io,
        _ => ErrorCode::Usb,
    };
    warn!("{}: {} ({:?})", op, err, code);
    code
}

fn poll_readable(fd: RawFd, timeout: Duration) -> bool {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let millis = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
    // Safety: pollfd is a valid array of length one.
    let ready = unsafe { libc::poll(&mut pollfd, 1, millis) };
    ready > 0 && pollfd.revents & (libc::POLLIN | libc::POLLHUP) != 0
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // Safety: fcntl on a descriptor we were handed; failures are reported via errno.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pump_without_attachment_reports_no_channel() {
        let Ok(mut ctx) = UsbUartContext::new() else {
            return;
        };
        assert_eq!(ctx.pump(Duration::ZERO), ResultCode::NO_CHANNEL);
        assert_eq!(ctx.status(Channel::duplex(3)), Status::empty());
    }

    #[test]
    fn context_can_be_created_repeatedly_without_discovery() {
        let Ok(first) = UsbUartContext::new() else {
            return;
        };
        let second = UsbUartContext::new().expect("second context after the first one");
        assert!(first.attachment.is_none());
        assert!(second.attachment.is_none());
    }

    #[test]
    fn close_is_idempotent_without_attachment() {
        let Ok(mut ctx) = UsbUartContext::new() else {
            return;
        };
        ctx.close(Channel::duplex(3));
        ctx.close(Channel::duplex(3));
        assert_eq!(ctx.pump(Duration::ZERO), ResultCode::NO_CHANNEL);
    }

    #[test]
    fn attach_rejects_bad_channel() {
        let Ok(mut ctx) = UsbUartContext::new() else {
            return;
        };
        let handle = DeviceHandle::new(0).unwrap();
        let res = ctx.attach(handle, 0, Channel::BAD, &LineConfig::default());
        assert_eq!(res, ResultCode::error(ErrorCode::InvalidParam));
    }

    #[test]
    fn split_function_claims_both_interfaces() {
        let split = Endpoints {
            control_iface: 0,
            data_iface: 1,
            bulk_in: 0x81,
            bulk_out: 0x01,
        };
        assert_eq!(split.interfaces(), vec![0, 1]);

        let shared = Endpoints {
            control_iface: 2,
            data_iface: 2,
            ..split
        };
        assert_eq!(shared.interfaces(), vec![2]);
    }

    #[test]
    fn rusb_errors_map_to_device_codes() {
        assert_eq!(map_rusb_error("t", rusb::Error::NoDevice), ErrorCode::NoDevice);
        assert_eq!(map_rusb_error("t", rusb::Error::Access), ErrorCode::NoAccess);
        assert_eq!(map_rusb_error("t", rusb::Error::Other), ErrorCode::Usb);
    }
}
