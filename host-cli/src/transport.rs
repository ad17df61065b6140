use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{SerialPort, SerialPortType};
use shared::error::SharedError;
use shared::schema::{
    DeviceResponse, HostRequest, ResponseStatus, decode_device_response, encode_host_request,
};

const SERIAL_BAUD_RATE: u32 = 115_200;
/// Raspberry Pi RP2040/RP2350 USB vendor id.
const PICO_USB_VID: u16 = 0x2E8A;
const IDENTITY_KEYWORDS: &[&str] = &["slotkey", "pico"];
/// Longest response line accepted from the device.
const MAX_LINE_LEN: usize = 4096;
/// Non-JSON lines (boot banners, log output) skipped before giving up.
const MAX_NOISE_LINES: usize = 16;

/// Bidirectional byte stream to a token.
pub trait DeviceTransport {
    fn write_line(&mut self, line: &[u8]) -> Result<(), SharedError>;

    /// Read one line without its terminator.
    fn read_line(&mut self) -> Result<Vec<u8>, SharedError>;

    fn send_request(&mut self, request: &HostRequest) -> Result<(), SharedError> {
        let line = encode_host_request(request)?;
        self.write_line(&line)
    }

    /// Read the next response, skipping any interleaved log lines.
    fn read_response(&mut self) -> Result<DeviceResponse, SharedError> {
        for _ in 0..MAX_NOISE_LINES {
            let line = self.read_line()?;
            let trimmed = line.trim_ascii();
            if trimmed.first() != Some(&b'{') {
                continue;
            }
            return Ok(decode_device_response(trimmed)?);
        }
        Err(SharedError::Transport(
            "device produced no response line".into(),
        ))
    }

    /// Send `request` and return the response, turning an error status into
    /// [`SharedError::Device`].
    fn exchange(&mut self, request: &HostRequest) -> Result<DeviceResponse, SharedError> {
        self.send_request(request)?;
        let response = self.read_response()?;
        match response.status {
            ResponseStatus::Ok => Ok(response),
            ResponseStatus::Error => Err(SharedError::Device {
                code: response.code,
                message: response.message.unwrap_or_else(|| "unspecified error".into()),
            }),
        }
    }
}

impl<T> DeviceTransport for T
where
    T: Read + Write + ?Sized,
{
    fn write_line(&mut self, line: &[u8]) -> Result<(), SharedError> {
        self.write_all(line).map_err(map_io_error("write request"))?;
        self.flush().map_err(map_io_error("flush request"))
    }

    fn read_line(&mut self) -> Result<Vec<u8>, SharedError> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let read = self.read(&mut byte).map_err(map_io_error("read response"))?;
            if read == 0 {
                return Err(SharedError::Transport(
                    "device closed the connection".into(),
                ));
            }
            match byte[0] {
                b'\n' => return Ok(line),
                b'\r' => {}
                other => {
                    if line.len() >= MAX_LINE_LEN {
                        return Err(SharedError::Transport(format!(
                            "response line exceeds {MAX_LINE_LEN} bytes"
                        )));
                    }
                    line.push(other);
                }
            }
        }
    }
}

pub fn open_serial_port(path: &str, timeout: Duration) -> Result<Box<dyn SerialPort>, SharedError> {
    let mut port = serialport::new(path, SERIAL_BAUD_RATE)
        .timeout(timeout)
        .open()
        .map_err(|err| {
            SharedError::Transport(format!("failed to open serial port {path}: {err}"))
        })?;

    port.set_timeout(timeout).map_err(|err| {
        SharedError::Transport(format!("failed to configure timeout on {path}: {err}"))
    })?;

    Ok(port)
}

pub fn detect_first_serial_port(allow_any_port: bool) -> Result<String, SharedError> {
    let ports = serialport::available_ports().map_err(|err| {
        SharedError::Transport(format!("failed to enumerate serial ports: {err}"))
    })?;

    select_serial_port(&ports, allow_any_port)
        .map(|info| info.port_name.clone())
        .ok_or_else(|| missing_device_error(allow_any_port))
}

pub(crate) fn select_serial_port(
    ports: &[serialport::SerialPortInfo],
    allow_any_port: bool,
) -> Option<&serialport::SerialPortInfo> {
    if allow_any_port {
        return ports
            .iter()
            .find(|info| matches!(info.port_type, SerialPortType::UsbPort(_)));
    }

    let matches: Vec<&serialport::SerialPortInfo> =
        ports.iter().filter(|info| matches_vendor(info)).collect();

    matches
        .iter()
        .copied()
        .find(|info| matches_identity(info))
        .or_else(|| matches.first().copied())
}

fn matches_vendor(info: &serialport::SerialPortInfo) -> bool {
    matches!(&info.port_type, SerialPortType::UsbPort(usb) if usb.vid == PICO_USB_VID)
}

fn matches_identity(info: &serialport::SerialPortInfo) -> bool {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => [
            usb.product.as_deref(),
            usb.manufacturer.as_deref(),
            usb.serial_number.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(contains_keyword),
        _ => false,
    }
}

fn contains_keyword(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    IDENTITY_KEYWORDS
        .iter()
        .any(|keyword| lower.contains(keyword))
}

fn missing_device_error(allow_any_port: bool) -> SharedError {
    let mut message =
        format!("slotkey serial device not found (expected USB VID 0x{PICO_USB_VID:04X}).");

    if !allow_any_port {
        message.push_str(" Pass --any-port to connect to the first available USB serial device.");
    }

    SharedError::Transport(message)
}

fn map_io_error(context: &'static str) -> impl Fn(io::Error) -> SharedError {
    move |err| {
        let mut message = format!("{context} failed: {err}");
        if err.kind() == io::ErrorKind::TimedOut {
            message.push_str(" (operation timed out)");
        }
        SharedError::Transport(message)
    }
}
