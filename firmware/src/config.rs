//! Board configuration resolved once at startup.
use alloc::string::String;
use serde::Deserialize;

use shared::vault::DEFAULT_TIMEOUT_SECS;

/// Firmware version reported by `PING` and `GET_ID`.
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_DEBOUNCE_MS: u64 = 50;
pub const DEFAULT_LONG_PRESS_MS: u64 = 1_000;
/// Longest request line accepted from the host, newline excluded.
pub const LINE_LIMIT: usize = 512;
pub const DEFAULT_TICK_MS: u64 = 10;
/// Upper bound for the post-emission release wait.
pub const DEFAULT_RELEASE_WAIT_MS: u64 = 5_000;

/// Optional collaborators present on this board.
///
/// Probed once by the board crate; the core only consults these flags and never asks the
/// hardware again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub usb_keyboard: bool,
    pub ble_keyboard: bool,
    pub display: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            usb_keyboard: true,
            ble_keyboard: false,
            display: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub debounce_ms: u64,
    pub long_press_ms: u64,
    pub tick_ms: u64,
    pub release_wait_ms: u64,
    /// Auto-lock timeout used until the vault stores its own.
    pub default_timeout_secs: u32,
    pub version: String,
    pub capabilities: Capabilities,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            long_press_ms: DEFAULT_LONG_PRESS_MS,
            tick_ms: DEFAULT_TICK_MS,
            release_wait_ms: DEFAULT_RELEASE_WAIT_MS,
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            version: String::from(FIRMWARE_VERSION),
            capabilities: Capabilities::default(),
        }
    }
}

impl DeviceConfig {
    /// Parse a JSON configuration document; absent fields keep their defaults.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_board_constants() {
        let config = DeviceConfig::default();

        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.long_press_ms, 1_000);
        assert_eq!(config.default_timeout_secs, 120);
        assert!(config.capabilities.usb_keyboard);
        assert!(!config.capabilities.display);
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let config =
            DeviceConfig::from_json(br#"{"capabilities":{"ble_keyboard":true},"tick_ms":5}"#)
                .expect("parse config");

        assert_eq!(config.tick_ms, 5);
        assert_eq!(config.debounce_ms, DEFAULT_DEBOUNCE_MS);
        assert!(config.capabilities.ble_keyboard);
        assert!(config.capabilities.usb_keyboard);
    }
}
