//! Keystroke output: delivering a pending secret to every connected keyboard transport.
use alloc::{boxed::Box, vec::Vec};
use core::fmt;

use crate::config::Capabilities;
use crate::session::PendingSecret;
use crate::transport::LinkKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputError {
    /// The link dropped while typing.
    Disconnected,
    /// A character has no key mapping on this layout.
    Unmappable(char),
    /// The transport rejected a report.
    Rejected,
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputError::Disconnected => write!(f, "link disconnected"),
            OutputError::Unmappable(ch) => write!(f, "no key mapping for {ch:?}"),
            OutputError::Rejected => write!(f, "report rejected"),
        }
    }
}

impl core::error::Error for OutputError {}

/// A transport able to type text on the host, such as a USB HID keyboard or a BLE HID link.
pub trait KeystrokeSink {
    fn kind(&self) -> LinkKind;

    fn name(&self) -> &str;

    fn is_connected(&self) -> bool;

    fn type_text(&mut self, text: &str) -> Result<(), OutputError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub delivered: usize,
}

impl DeliveryReport {
    pub fn any_delivered(&self) -> bool {
        self.delivered > 0
    }
}

/// Every configured output transport.
#[derive(Default)]
pub struct OutputFanout {
    sinks: Vec<Box<dyn KeystrokeSink>>,
}

impl fmt::Debug for OutputFanout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.sinks.iter().map(|sink| sink.name()))
            .finish()
    }
}

impl OutputFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sink` when the board reported the matching capability.
    pub fn attach(&mut self, capabilities: &Capabilities, sink: Box<dyn KeystrokeSink>) -> bool {
        let enabled = match sink.kind() {
            LinkKind::Usb => capabilities.usb_keyboard,
            LinkKind::Ble => capabilities.ble_keyboard,
        };
        if enabled {
            self.sinks.push(sink);
        } else {
            log::info!("{} output not available on this board", sink.name());
        }
        enabled
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Type `secret` on every connected sink. A failing sink is logged and does not stop the
    /// remaining ones.
    pub fn deliver(&mut self, secret: &PendingSecret) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for sink in self.sinks.iter_mut() {
            if !sink.is_connected() {
                log::debug!("{} not connected, skipping", sink.name());
                continue;
            }
            report.attempted += 1;
            match sink.type_text(secret.plaintext()) {
                Ok(()) => report.delivered += 1,
                Err(err) => log::warn!("{} failed to type {}: {err}", sink.name(), secret.label()),
            }
        }
        if report.attempted == 0 {
            log::warn!("no output connected, {} dropped", secret.label());
        }
        report
    }
}
