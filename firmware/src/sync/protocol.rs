use alloc::{string::String, string::ToString, vec::Vec};
use core::fmt;

use shared::license::LicenseStatus;
use shared::schema::{
    DeviceResponse, ErrorCode, HostRequest, RequestError, decode_host_request,
    encode_device_response,
};
use zeroize::{Zeroize, Zeroizing};

use super::line::{LineBuffer, LineEvent};
use crate::config::{DeviceConfig, LINE_LIMIT};
use crate::error::{DeviceError, HardwareFault, ProtocolError};
use crate::license::LicenseGate;
use crate::session::{LockReason, SessionStateMachine};
use crate::storage::Storage;
use crate::transport::HostChannel;

/// Bytes requested from the channel per tick.
const READ_CHUNK: usize = 64;
/// Received bytes held back while earlier lines are still being dispatched.
const INBOX_CAPACITY: usize = 4 * LINE_LIMIT;

/// Outcome of one protocol poll.
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    Request(HostRequest),
    Rejected { error: ProtocolError, detail: String },
}

impl Inbound {
    /// Response for a line that never became a request.
    pub fn rejection(error: ProtocolError, detail: &str) -> DeviceResponse {
        match error {
            ProtocolError::UnknownCommand => DeviceResponse::unknown_command(),
            _ => DeviceResponse::error(Some(ErrorCode::ProtocolError), detail),
        }
    }
}

/// Fixed receive buffer. Consumed bytes are zeroed as they are compacted away, so request
/// bodies never linger in spare capacity.
struct Inbox {
    bytes: [u8; INBOX_CAPACITY],
    filled: usize,
}

impl Inbox {
    const fn new() -> Self {
        Self {
            bytes: [0; INBOX_CAPACITY],
            filled: 0,
        }
    }

    fn free(&self) -> usize {
        INBOX_CAPACITY - self.filled
    }

    fn pending(&self) -> &[u8] {
        &self.bytes[..self.filled]
    }

    fn append(&mut self, data: &[u8]) {
        let count = data.len().min(self.free());
        self.bytes[self.filled..self.filled + count].copy_from_slice(&data[..count]);
        self.filled += count;
    }

    fn consume(&mut self, count: usize) {
        let count = count.min(self.filled);
        let remaining = self.filled - count;
        self.bytes.copy_within(count..self.filled, 0);
        self.bytes[remaining..self.filled].zeroize();
        self.filled = remaining;
    }
}

impl Drop for Inbox {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// Turns the host byte stream into at most one request per tick.
pub struct ProtocolDispatcher {
    inbox: Inbox,
    line: LineBuffer,
}

impl fmt::Debug for ProtocolDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolDispatcher")
            .field("buffered", &self.inbox.filled)
            .field("line", &self.line.len())
            .finish()
    }
}

impl Default for ProtocolDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolDispatcher {
    pub fn new() -> Self {
        Self {
            inbox: Inbox::new(),
            line: LineBuffer::new(),
        }
    }

    /// One non-blocking read followed by line assembly.
    ///
    /// Bytes beyond the first complete line stay queued for the following ticks.
    pub fn poll<C>(&mut self, channel: &mut C) -> Result<Option<Inbound>, HardwareFault>
    where
        C: HostChannel + ?Sized,
    {
        if self.inbox.free() >= READ_CHUNK {
            let mut chunk = [0u8; READ_CHUNK];
            let count = channel.read(&mut chunk)?.min(READ_CHUNK);
            self.inbox.append(&chunk[..count]);
            chunk.zeroize();
        }

        let mut consumed = 0;
        let mut inbound = None;
        for &byte in self.inbox.pending() {
            consumed += 1;
            match self.line.push(byte) {
                None => {}
                Some(LineEvent::Overflow) => {
                    inbound = Some(Inbound::Rejected {
                        error: ProtocolError::BufferOverflow,
                        detail: DeviceError::from(ProtocolError::BufferOverflow).to_string(),
                    });
                    break;
                }
                Some(LineEvent::Line(line)) => {
                    inbound = Some(parse_line(&line));
                    break;
                }
            }
        }
        self.inbox.consume(consumed);
        Ok(inbound)
    }
}

fn parse_line(line: &[u8]) -> Inbound {
    match decode_host_request(line) {
        Ok(request) => Inbound::Request(request),
        Err(RequestError::UnknownCommand(name)) => {
            log::warn!("unknown command {name}");
            Inbound::Rejected {
                error: ProtocolError::UnknownCommand,
                detail: name,
            }
        }
        Err(RequestError::Malformed(reason)) => {
            log::warn!("malformed request: {reason}");
            Inbound::Rejected {
                error: ProtocolError::ParseFailure,
                detail: RequestError::Malformed(reason).to_string(),
            }
        }
    }
}

/// Everything a host command may read or mutate.
pub struct CommandContext<'a, S: ?Sized> {
    pub config: &'a DeviceConfig,
    pub license: &'a mut LicenseGate,
    pub session: &'a mut SessionStateMachine,
    pub storage: &'a mut S,
}

/// Execute one request and build its response. Failures become error responses; nothing here
/// can stop the control loop.
pub fn handle_request<S>(request: HostRequest, now_ms: u64, ctx: CommandContext<'_, S>) -> DeviceResponse
where
    S: Storage + ?Sized,
{
    let name = request.name();
    match execute(request, now_ms, ctx) {
        Ok(response) => response,
        Err(err) => {
            log::warn!("{name} failed: {err}");
            DeviceResponse::error(Some(err.code()), err.to_string())
        }
    }
}

fn execute<S>(request: HostRequest, now_ms: u64, ctx: CommandContext<'_, S>) -> Result<DeviceResponse, DeviceError>
where
    S: Storage + ?Sized,
{
    let CommandContext {
        config,
        license,
        session,
        storage,
    } = ctx;

    let response = match request {
        HostRequest::Ping => DeviceResponse {
            version: Some(config.version.clone()),
            board_id: Some(license.identity().id.clone()),
            board_type: Some(license.identity().board_type.clone()),
            license: Some(license.status(storage)),
            unlocked: Some(session.is_unlocked()),
            ..DeviceResponse::ok()
        }
        .with_message("pong"),
        HostRequest::GetId => DeviceResponse {
            version: Some(config.version.clone()),
            board_id: Some(license.identity().id.clone()),
            board_type: Some(license.identity().board_type.clone()),
            license: Some(license.status(storage)),
            activation_request: Some(license.activation_request()),
            ..DeviceResponse::ok()
        },
        HostRequest::Activate { key } => {
            license.activate(key.trim(), storage)?;
            DeviceResponse {
                license: Some(LicenseStatus::Activated),
                ..DeviceResponse::ok()
            }
            .with_message("activated")
        }
        HostRequest::Unlock { password } => {
            let password = Zeroizing::new(password);
            session.unlock(&password, now_ms, storage)?;
            DeviceResponse {
                unlocked: Some(true),
                ..DeviceResponse::ok()
            }
        }
        HostRequest::Lock => {
            session.lock(LockReason::Explicit);
            DeviceResponse {
                unlocked: Some(false),
                ..DeviceResponse::ok()
            }
        }
        HostRequest::Status => DeviceResponse {
            unlocked: Some(session.is_unlocked()),
            slots: Some(session.slot_flags().to_vec()),
            license: Some(license.status(storage)),
            ..DeviceResponse::ok()
        }
        .with_timeout(session.timeout_secs()),
        HostRequest::AddPassword { slot, password } => {
            let password = Zeroizing::new(password);
            session.add_secret(slot, &password, storage)?;
            slots_response(session)
        }
        HostRequest::DeletePassword { slot } => {
            session.delete_secret(slot, storage)?;
            slots_response(session)
        }
        HostRequest::TypePassword { slot } => {
            session.queue_secret(slot)?;
            DeviceResponse::ok().with_message("queued")
        }
        HostRequest::SetTimeout { timeout } => {
            let applied = session.set_timeout(timeout, storage)?;
            DeviceResponse::ok().with_timeout(applied)
        }
        HostRequest::Reset => {
            let vault = session.factory_reset(storage);
            let activation = license.reset(storage);
            vault.and(activation)?;
            DeviceResponse {
                unlocked: Some(false),
                license: Some(LicenseStatus::NotActivated),
                ..DeviceResponse::ok()
            }
            .with_message("reset")
        }
    };
    Ok(response)
}

fn slots_response(session: &SessionStateMachine) -> DeviceResponse {
    DeviceResponse {
        slots: Some(session.slot_flags().to_vec()),
        ..DeviceResponse::ok()
    }
}

/// Encode a response line; encoding a response cannot fail for well-formed values.
pub fn response_line(response: &DeviceResponse) -> Option<Vec<u8>> {
    match encode_device_response(response) {
        Ok(line) => Some(line),
        Err(err) => {
            log::error!("response encoding failed: {err}");
            None
        }
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod protocol_tests;
