use std::collections::VecDeque;
use std::io::{self, Cursor, Read, Write};

use serialport::SerialPortType;
use shared::error::SharedError;
use shared::schema::{DeviceResponse, HostRequest, decode_host_request, encode_device_response};

use crate::commands::{self, Prompt};

pub(crate) struct MockPort {
    pub(crate) read_cursor: Cursor<Vec<u8>>,
    pub(crate) writes: Vec<u8>,
}

impl MockPort {
    pub(crate) fn new(read_data: Vec<u8>) -> Self {
        Self {
            read_cursor: Cursor::new(read_data),
            writes: Vec::new(),
        }
    }

    /// Port that answers with `responses`, one line each, in order.
    pub(crate) fn replying(responses: &[DeviceResponse]) -> Self {
        let mut data = Vec::new();
        for response in responses {
            data.extend_from_slice(&encode_response(response));
        }
        Self::new(data)
    }

    /// Every request written so far, decoded.
    pub(crate) fn requests(&self) -> Vec<HostRequest> {
        self.writes
            .split(|byte| *byte == b'\n')
            .filter(|line| !line.is_empty())
            .map(|line| decode_host_request(line).expect("decode request"))
            .collect()
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_cursor.read(buf)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Port whose reads always time out.
pub(crate) struct SilentPort;

impl Read for SilentPort {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::TimedOut, "no data"))
    }
}

impl Write for SilentPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Prompt that replays scripted answers and fails when it runs out.
#[derive(Default)]
pub(crate) struct ScriptedPrompt {
    pub(crate) secrets: VecDeque<String>,
    pub(crate) confirmations: VecDeque<bool>,
    pub(crate) asked: Vec<String>,
}

impl ScriptedPrompt {
    pub(crate) fn with_secret(secret: &str) -> Self {
        Self {
            secrets: VecDeque::from([secret.to_string()]),
            ..Self::default()
        }
    }

    pub(crate) fn with_confirmation(answer: bool) -> Self {
        Self {
            confirmations: VecDeque::from([answer]),
            ..Self::default()
        }
    }
}

impl Prompt for ScriptedPrompt {
    fn secret(&mut self, label: &str) -> Result<String, SharedError> {
        self.asked.push(label.to_string());
        self.secrets
            .pop_front()
            .ok_or_else(|| SharedError::Transport("no scripted secret".into()))
    }

    fn confirm(&mut self, question: &str) -> Result<bool, SharedError> {
        self.asked.push(question.to_string());
        self.confirmations
            .pop_front()
            .ok_or_else(|| SharedError::Transport("no scripted confirmation".into()))
    }
}

pub(crate) fn encode_response(response: &DeviceResponse) -> Vec<u8> {
    encode_device_response(response).expect("encode response")
}

pub(crate) fn usb_port(
    name: &str,
    vid: u16,
    pid: u16,
    manufacturer: Option<&str>,
    product: Option<&str>,
) -> serialport::SerialPortInfo {
    serialport::SerialPortInfo {
        port_name: name.to_string(),
        port_type: SerialPortType::UsbPort(serialport::UsbPortInfo {
            vid,
            pid,
            serial_number: None,
            manufacturer: manufacturer.map(|value| value.to_string()),
            product: product.map(|value| value.to_string()),
            interface: None,
        }),
    }
}

pub(crate) fn non_usb_port(name: &str) -> serialport::SerialPortInfo {
    serialport::SerialPortInfo {
        port_name: name.to_string(),
        port_type: SerialPortType::PciPort,
    }
}

pub(crate) fn assert_mock_port_is_device_transport() {
    fn assert_transport<T: commands::DeviceTransport>() {}
    assert_transport::<MockPort>();
}
