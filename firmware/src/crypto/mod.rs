//! Passphrase-derived key handling and slot encryption.
//!
//! Slots are sealed with AES-256-CBC and PKCS7 padding under a key derived from the master
//! passphrase and the board id. The scheme carries no authentication tag: a corrupted ciphertext
//! decrypts to garbage instead of failing, and callers must treat decrypted slots accordingly.
use alloc::{boxed::Box, string::String, vec::Vec};
use core::fmt;

use aes::Aes256;
use cbc::cipher::{
    BlockDecryptMut, BlockEncryptMut, KeyIvInit,
    block_padding::{NoPadding, Pkcs7},
};
use rand_core::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use shared::vault::{IV_LEN, SealedSecret};
use zeroize::Zeroizing;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

pub const KEY_LEN: usize = 32;
pub const BLOCK_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultError {
    /// No derived key is cached; the session is locked.
    NotUnlocked,
    /// The board has no entropy source, so no slot can be sealed or opened.
    Unavailable,
    /// Ciphertext length is not a whole number of cipher blocks.
    MalformedCiphertext,
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            VaultError::NotUnlocked => "vault key not derived, unlock first",
            VaultError::Unavailable => "cipher backend unavailable",
            VaultError::MalformedCiphertext => "ciphertext is not block aligned",
        };
        write!(f, "{label}")
    }
}

impl core::error::Error for VaultError {}

/// Cryptographically secure RNG used to draw initialization vectors.
pub trait EntropySource: RngCore + CryptoRng {}

impl<T: RngCore + CryptoRng> EntropySource for T {}

pub struct CredentialVault {
    board_id: String,
    key: Option<Zeroizing<[u8; KEY_LEN]>>,
    entropy: Option<Box<dyn EntropySource>>,
}

impl fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialVault")
            .field("board_id", &self.board_id)
            .field("unlocked", &self.key.is_some())
            .field("available", &self.entropy.is_some())
            .finish()
    }
}

impl CredentialVault {
    /// Build the vault for this board. Passing `None` marks the cipher backend as unavailable.
    pub fn new(board_id: impl Into<String>, entropy: Option<Box<dyn EntropySource>>) -> Self {
        let board_id = board_id.into();
        if entropy.is_none() {
            log::warn!("no entropy source, slot encryption disabled");
        }
        Self {
            board_id,
            key: None,
            entropy,
        }
    }

    pub fn is_available(&self) -> bool {
        self.entropy.is_some()
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// Derive `SHA-256(passphrase || board_id)` and cache it.
    ///
    /// While a key is cached the passphrase is ignored; call [`clear_key`](Self::clear_key) first
    /// to derive from a different passphrase.
    pub fn derive_key(&mut self, passphrase: &str) {
        if self.key.is_some() {
            return;
        }
        let mut hasher = Sha256::new();
        hasher.update(passphrase.as_bytes());
        hasher.update(self.board_id.as_bytes());
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(&hasher.finalize());
        self.key = Some(key);
    }

    /// Verification hash stored as the master credential. Independent of key derivation.
    pub fn hash_password(passphrase: &str) -> String {
        hex::encode(Sha256::digest(passphrase.as_bytes()))
    }

    pub fn clear_key(&mut self) {
        // Zeroizing wipes the buffer on drop.
        self.key = None;
    }

    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<SealedSecret, VaultError> {
        let entropy = self.entropy.as_mut().ok_or(VaultError::Unavailable)?;
        let key = self.key.as_ref().ok_or(VaultError::NotUnlocked)?;

        let mut iv = [0u8; IV_LEN];
        entropy.fill_bytes(&mut iv);
        let cipher = Aes256CbcEnc::new_from_slices(key.as_ref(), &iv)
            .map_err(|_| VaultError::Unavailable)?;
        let data = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);
        Ok(SealedSecret { iv, data })
    }

    /// Decrypt a sealed slot.
    ///
    /// Padding is stripped by trusting the last byte. A pad length above the block size is
    /// treated as "no padding" and the whole buffer is returned. A pad length of zero strips
    /// everything, so the plaintext is empty.
    pub fn decrypt(&self, sealed: &SealedSecret) -> Result<Zeroizing<Vec<u8>>, VaultError> {
        if self.entropy.is_none() {
            return Err(VaultError::Unavailable);
        }
        let key = self.key.as_ref().ok_or(VaultError::NotUnlocked)?;
        if sealed.data.is_empty() {
            return Ok(Zeroizing::new(Vec::new()));
        }
        if sealed.data.len() % BLOCK_LEN != 0 {
            return Err(VaultError::MalformedCiphertext);
        }

        let cipher = Aes256CbcDec::new_from_slices(key.as_ref(), &sealed.iv)
            .map_err(|_| VaultError::Unavailable)?;
        let buffer = cipher
            .decrypt_padded_vec_mut::<NoPadding>(&sealed.data)
            .map_err(|_| VaultError::MalformedCiphertext)?;
        Ok(Zeroizing::new(strip_padding(buffer)))
    }
}

fn strip_padding(mut buffer: Vec<u8>) -> Vec<u8> {
    let Some(&last) = buffer.last() else {
        return buffer;
    };
    let pad = last as usize;
    if pad > BLOCK_LEN || pad > buffer.len() {
        return buffer;
    }
    // A zero pad length consumes the whole buffer, matching tokens already in the field.
    let keep = if pad == 0 { 0 } else { buffer.len() - pad };
    buffer[keep..].iter_mut().for_each(|byte| *byte = 0);
    buffer.truncate(keep);
    buffer
}
