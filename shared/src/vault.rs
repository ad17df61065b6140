//! Persisted vault image: master credential hash, sealed slots and the auto-lock timeout.
//!
//! The blob is the only thing the firmware hands to its storage collaborator. Binary fields are
//! base64 encoded so the image can live on textual media as a single JSON document.
use alloc::{string::String, vec::Vec};
use base64::{Engine, engine::general_purpose::STANDARD as Base64};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of credential slots exposed by the token.
pub const SLOT_COUNT: usize = 4;
/// AES block size and CBC initialization vector length.
pub const IV_LEN: usize = 16;
/// Lower bound for the auto-lock timeout.
pub const MIN_TIMEOUT_SECS: u32 = 30;
/// Upper bound for the auto-lock timeout.
pub const MAX_TIMEOUT_SECS: u32 = 600;
/// Timeout applied to devices that were never configured.
pub const DEFAULT_TIMEOUT_SECS: u32 = 120;

/// Clamp a requested timeout into `[MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS]`.
pub fn clamp_timeout(seconds: i64) -> u32 {
    seconds.clamp(MIN_TIMEOUT_SECS as i64, MAX_TIMEOUT_SECS as i64) as u32
}

/// IV and ciphertext of one occupied slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedSecret {
    pub iv: [u8; IV_LEN],
    pub data: Vec<u8>,
}

/// Text form of a sealed slot as it appears inside the stored JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EncodedSlot {
    iv: String,
    data: String,
}

impl SealedSecret {
    fn encode(&self) -> EncodedSlot {
        EncodedSlot {
            iv: Base64.encode(self.iv),
            data: Base64.encode(&self.data),
        }
    }

    fn decode(slot: &EncodedSlot) -> Option<Self> {
        let iv_bytes = Base64.decode(slot.iv.as_bytes()).ok()?;
        let iv: [u8; IV_LEN] = iv_bytes.as_slice().try_into().ok()?;
        let data = Base64.decode(slot.data.as_bytes()).ok()?;
        Some(Self { iv, data })
    }
}

/// Slot array indexed by slot number.
pub type SlotArray = [Option<SealedSecret>; SLOT_COUNT];

/// Serialized state handed to the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultBlob {
    /// Hex SHA-256 of the master passphrase. `None` until the vault is bootstrapped.
    #[serde(default)]
    pub master_hash: Option<String>,
    #[serde(default, with = "slot_codec")]
    pub slots: SlotArray,
    #[serde(rename = "timeout", default = "default_timeout")]
    pub auto_lock_timeout_secs: u32,
}

fn default_timeout() -> u32 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for VaultBlob {
    fn default() -> Self {
        Self {
            master_hash: None,
            slots: Default::default(),
            auto_lock_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl VaultBlob {
    /// Occupancy flag for every slot, in slot order.
    pub fn slot_flags(&self) -> [bool; SLOT_COUNT] {
        core::array::from_fn(|index| self.slots[index].is_some())
    }

    /// Encode the blob as a JSON document.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode a JSON document produced by [`VaultBlob::to_json`].
    ///
    /// Slots whose base64 payload is damaged load as empty; the timeout is clamped into range.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let mut blob: VaultBlob = serde_json::from_slice(bytes)?;
        blob.auto_lock_timeout_secs = clamp_timeout(blob.auto_lock_timeout_secs as i64);
        Ok(blob)
    }
}

mod slot_codec {
    use super::*;

    pub fn serialize<S>(slots: &SlotArray, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded: Vec<Option<EncodedSlot>> = slots
            .iter()
            .map(|slot| slot.as_ref().map(SealedSecret::encode))
            .collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SlotArray, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Vec<Option<EncodedSlot>> = Vec::deserialize(deserializer)?;
        let mut slots: SlotArray = Default::default();
        for (slot, raw) in slots.iter_mut().zip(encoded.iter()) {
            *slot = raw.as_ref().and_then(SealedSecret::decode);
        }
        Ok(slots)
    }
}
