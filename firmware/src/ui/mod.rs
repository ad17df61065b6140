//! Physical user interface: button decoding and status indication.
//!
//! Both halves are hardware-agnostic. The board crate supplies a [`ButtonBank`] and a
//! [`StatusIndicator`]; everything here runs in host tests unchanged.

mod indicator;
mod input;

pub use indicator::{NullIndicator, StatusIndicator, StatusSignal, select_indicator};
#[cfg(test)]
pub(crate) use indicator::testing;
pub use input::{
    BUTTON_COUNT, ButtonBank, ButtonEvent, ButtonIntent, ButtonLevels, CONTROL_BUTTON,
    InputDecoder, PressKind, intent_for,
};
