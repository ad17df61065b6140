//! Persistence contract for the vault blob and the license key.
//!
//! The firmware never touches a filesystem or flash driver directly. Boards implement
//! [`TextMedium`] (or the whole [`Storage`] trait) and the core only sees whole-blob load/save.
use alloc::{collections::BTreeMap, string::String};
use core::fmt;

use shared::vault::VaultBlob;

/// Name of the document holding the serialized vault.
pub const VAULT_FILE: &str = "vault.json";
/// Name of the document holding the activation key.
pub const LICENSE_FILE: &str = "license.key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// The medium rejected a read or write.
    IoFailure,
    /// A stored document exists but cannot be decoded.
    CorruptBlob,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::IoFailure => write!(f, "storage i/o failure"),
            StorageError::CorruptBlob => write!(f, "stored vault is corrupt"),
        }
    }
}

impl core::error::Error for StorageError {}

/// Whole-blob persistence used by the session and the license gate.
pub trait Storage {
    /// Load the vault. `Ok(None)` means the device was never configured, or a previous write was
    /// interrupted before anything usable reached the medium.
    fn load(&mut self) -> Result<Option<VaultBlob>, StorageError>;

    fn save(&mut self, blob: &VaultBlob) -> Result<(), StorageError>;

    fn load_license(&mut self) -> Result<Option<String>, StorageError>;

    fn save_license(&mut self, key: &str) -> Result<(), StorageError>;

    fn erase_license(&mut self) -> Result<(), StorageError>;
}

/// Named text documents on some medium (a FAT volume, a key/value flash partition, ...).
pub trait TextMedium {
    fn read(&mut self, name: &str) -> Result<Option<String>, StorageError>;
    fn write(&mut self, name: &str, contents: &str) -> Result<(), StorageError>;
    fn remove(&mut self, name: &str) -> Result<(), StorageError>;
}

/// [`Storage`] over a textual medium: the vault is one JSON document with base64 slot fields.
#[derive(Debug, Default)]
pub struct TextStorage<M> {
    medium: M,
}

impl<M: TextMedium> TextStorage<M> {
    pub fn new(medium: M) -> Self {
        Self { medium }
    }

    pub fn medium(&self) -> &M {
        &self.medium
    }

    pub fn medium_mut(&mut self) -> &mut M {
        &mut self.medium
    }
}

impl<M: TextMedium> Storage for TextStorage<M> {
    fn load(&mut self) -> Result<Option<VaultBlob>, StorageError> {
        let Some(text) = self.medium.read(VAULT_FILE)? else {
            return Ok(None);
        };
        if text.trim().is_empty() {
            log::warn!("vault document is empty, treating device as unconfigured");
            return Ok(None);
        }
        VaultBlob::from_json(text.as_bytes())
            .map(Some)
            .map_err(|_| StorageError::CorruptBlob)
    }

    fn save(&mut self, blob: &VaultBlob) -> Result<(), StorageError> {
        let bytes = blob.to_json().map_err(|_| StorageError::IoFailure)?;
        let text = core::str::from_utf8(&bytes).map_err(|_| StorageError::IoFailure)?;
        self.medium.write(VAULT_FILE, text)
    }

    fn load_license(&mut self) -> Result<Option<String>, StorageError> {
        Ok(self
            .medium
            .read(LICENSE_FILE)?
            .map(|key| String::from(key.trim())))
    }

    fn save_license(&mut self, key: &str) -> Result<(), StorageError> {
        self.medium.write(LICENSE_FILE, key)
    }

    fn erase_license(&mut self) -> Result<(), StorageError> {
        self.medium.remove(LICENSE_FILE)
    }
}

/// RAM-backed medium for simulation and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryMedium {
    documents: BTreeMap<String, String>,
    /// When set, every write and remove fails with [`StorageError::IoFailure`].
    pub fail_writes: bool,
    /// When set, every read fails with [`StorageError::IoFailure`].
    pub fail_reads: bool,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document(&self, name: &str) -> Option<&str> {
        self.documents.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: &str, contents: &str) {
        self.documents.insert(name.into(), contents.into());
    }
}

impl TextMedium for MemoryMedium {
    fn read(&mut self, name: &str) -> Result<Option<String>, StorageError> {
        if self.fail_reads {
            return Err(StorageError::IoFailure);
        }
        Ok(self.documents.get(name).cloned())
    }

    fn write(&mut self, name: &str, contents: &str) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::IoFailure);
        }
        self.documents.insert(name.into(), contents.into());
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::IoFailure);
        }
        self.documents.remove(name);
        Ok(())
    }
}

pub type MemoryStorage = TextStorage<MemoryMedium>;

impl MemoryStorage {
    pub fn in_memory() -> Self {
        Self::new(MemoryMedium::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::vault::{IV_LEN, SealedSecret};

    #[test]
    fn missing_documents_load_as_absent() {
        let mut storage = MemoryStorage::in_memory();

        assert_eq!(storage.load(), Ok(None));
        assert_eq!(storage.load_license(), Ok(None));
    }

    #[test]
    fn vault_is_persisted_as_json_text() {
        let mut storage = MemoryStorage::in_memory();
        let mut blob = VaultBlob {
            master_hash: Some("00".repeat(32)),
            auto_lock_timeout_secs: 300,
            ..VaultBlob::default()
        };
        blob.slots[1] = Some(SealedSecret {
            iv: [9u8; IV_LEN],
            data: alloc::vec![0xAA; 32],
        });

        storage.save(&blob).expect("save");

        let text = storage.medium().document(VAULT_FILE).expect("document");
        assert!(text.starts_with('{'));
        assert!(text.contains("\"master_hash\""));
        assert_eq!(storage.load().expect("load"), Some(blob));
    }

    #[test]
    fn interrupted_write_loads_as_absent() {
        let mut storage = MemoryStorage::in_memory();
        storage.medium_mut().insert(VAULT_FILE, "");

        assert_eq!(storage.load(), Ok(None));
    }

    #[test]
    fn garbage_document_is_corrupt() {
        let mut storage = MemoryStorage::in_memory();
        storage.medium_mut().insert(VAULT_FILE, "{\"slots\":");

        assert_eq!(storage.load(), Err(StorageError::CorruptBlob));
    }

    #[test]
    fn license_round_trip_and_erase() {
        let mut storage = MemoryStorage::in_memory();

        storage.save_license("0123456789abcdef").expect("save license");
        assert_eq!(
            storage.load_license().expect("load"),
            Some("0123456789abcdef".into())
        );

        storage.erase_license().expect("erase");
        assert_eq!(storage.load_license().expect("load"), None);
    }

    #[test]
    fn failing_medium_reports_io_failure() {
        let mut storage = MemoryStorage::in_memory();
        storage.medium_mut().fail_writes = true;

        assert_eq!(
            storage.save(&VaultBlob::default()),
            Err(StorageError::IoFailure)
        );
        assert_eq!(storage.save_license("k"), Err(StorageError::IoFailure));
    }
}
