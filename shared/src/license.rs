//! Board identity and the activation key bound to it.
use alloc::{format, string::String};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Salt mixed into every activation key.
pub const SECRET_SALT: &str = "PicoPass_Device_Secure_2026";

/// Number of hex characters kept from the digest.
pub const LICENSE_KEY_LEN: usize = 16;

/// Immutable hardware identity read once at boot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardIdentity {
    /// Uppercase hex of the chip unique id.
    pub id: String,
    /// Board family, e.g. `raspberry_pi_pico2`.
    pub board_type: String,
}

impl BoardIdentity {
    pub fn new(id: impl Into<String>, board_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            board_type: board_type.into(),
        }
    }

    /// Build an identity from the raw unique-id bytes exposed by the chip.
    pub fn from_unique_id(unique_id: &[u8], board_type: impl Into<String>) -> Self {
        Self::new(hex::encode_upper(unique_id), board_type)
    }

    /// Serial number used for licensing: the lowercase form of [`id`](Self::id).
    ///
    /// Keys already issued were derived from the lowercase serial, while the vault key and the
    /// reported id use the uppercase form.
    pub fn serial(&self) -> String {
        self.id.to_ascii_lowercase()
    }

    /// Activation key expected for this exact unit.
    ///
    /// Bound to both serial and board type so that every physical unit needs its own key.
    pub fn expected_key(&self) -> String {
        let material = format!("{}:{}:{}", self.serial(), self.board_type, SECRET_SALT);
        let digest = Sha256::digest(material.as_bytes());
        let mut key = hex::encode(digest);
        key.truncate(LICENSE_KEY_LEN);
        key
    }

    /// Request string a user forwards to obtain an activation key.
    pub fn activation_request(&self) -> String {
        format!("ACT_REQ:{}|{}", self.serial(), self.board_type)
    }
}

/// Entitlement state reported over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LicenseStatus {
    Activated,
    NotActivated,
}

impl LicenseStatus {
    pub fn is_activated(self) -> bool {
        matches!(self, LicenseStatus::Activated)
    }
}
