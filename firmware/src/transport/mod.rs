//! Byte channel to the host (USB CDC, UART, ...).
use alloc::{collections::VecDeque, vec::Vec};

use crate::error::HardwareFault;

/// Logical transports a board may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Wired USB link.
    Usb,
    /// Bluetooth LE link.
    Ble,
}

/// Non-blocking duplex byte stream carrying the line protocol.
pub trait HostChannel {
    /// Copy whatever bytes are available into `buf` without waiting. `Ok(0)` means nothing
    /// arrived since the last call.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, HardwareFault>;

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), HardwareFault>;
}

/// In-memory channel used by simulations and tests.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    incoming: VecDeque<u8>,
    outgoing: Vec<u8>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes as if the host had sent them.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.incoming.extend(bytes.iter().copied());
    }

    pub fn pending_input(&self) -> usize {
        self.incoming.len()
    }

    /// Everything the device wrote so far, leaving the buffer empty.
    pub fn take_output(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.outgoing)
    }
}

impl HostChannel for MemoryChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, HardwareFault> {
        let count = buf.len().min(self.incoming.len());
        for (slot, byte) in buf.iter_mut().zip(self.incoming.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), HardwareFault> {
        self.outgoing.extend_from_slice(bytes);
        Ok(())
    }
}
