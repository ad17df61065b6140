#![cfg_attr(not(test), no_std)]

//! Trusted core of the slotkey credential token.
//!
//! The crate holds the vault, the session state machine, button decoding and the host line
//! protocol. Board crates provide the collaborators (storage medium, host channel, buttons,
//! keystroke outputs, status indicator, clock and entropy) and call [`system::run`].

extern crate alloc;

pub mod config;
pub mod crypto;
pub mod error;
pub mod hid;
pub mod license;
pub mod session;
pub mod storage;
pub mod sync;
pub mod system;
pub mod time;
pub mod transport;
pub mod ui;

pub use error::{DeviceError, HardwareFault};
pub use system::{Device, FaultCause, run};
