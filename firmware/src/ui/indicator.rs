//! Visible status output (display, LED) as seen from the core.
use alloc::boxed::Box;

use shared::schema::ErrorCode;

use crate::config::Capabilities;

/// Status changes the core wants the user to see. How they are rendered is up to the board.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusSignal {
    Locked,
    Unlocked,
    /// Acknowledges a control short press.
    Pulse,
    /// Control long press while locked: unlock has to come from the host.
    AwaitingPassphrase,
    Typing,
    Delivered,
    Error(ErrorCode),
    /// Terminal fault; repeated every tick until power-cycled.
    Fault,
}

pub trait StatusIndicator {
    fn show(&mut self, signal: StatusSignal);
}

/// Indicator for boards without a display.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullIndicator;

impl StatusIndicator for NullIndicator {
    fn show(&mut self, signal: StatusSignal) {
        log::debug!("status {signal:?}");
    }
}

impl<T: StatusIndicator + ?Sized> StatusIndicator for Box<T> {
    fn show(&mut self, signal: StatusSignal) {
        (**self).show(signal);
    }
}

/// Use the board display only when the capability check found one.
pub fn select_indicator(
    capabilities: &Capabilities,
    display: Option<Box<dyn StatusIndicator>>,
) -> Box<dyn StatusIndicator> {
    match display {
        Some(display) if capabilities.display => display,
        _ => Box::new(NullIndicator),
    }
}
