//! Entitlement check binding the firmware to one physical board.
use alloc::string::String;

use shared::license::{BoardIdentity, LicenseStatus};

use crate::error::{ActivationError, DeviceError};
use crate::storage::Storage;

#[derive(Debug)]
pub struct LicenseGate {
    identity: BoardIdentity,
    status: Option<LicenseStatus>,
}

impl LicenseGate {
    pub fn new(identity: BoardIdentity) -> Self {
        Self {
            identity,
            status: None,
        }
    }

    pub fn identity(&self) -> &BoardIdentity {
        &self.identity
    }

    pub fn expected_key(&self) -> String {
        self.identity.expected_key()
    }

    pub fn validate(&self, key: &str) -> bool {
        key == self.identity.expected_key()
    }

    pub fn activation_request(&self) -> String {
        self.identity.activation_request()
    }

    /// Persist `key` and mark the board activated when it matches this unit.
    pub fn activate<S>(&mut self, key: &str, storage: &mut S) -> Result<(), DeviceError>
    where
        S: Storage + ?Sized,
    {
        if !self.validate(key) {
            log::warn!("activation rejected for board {}", self.identity.id);
            return Err(ActivationError::InvalidKey.into());
        }
        storage.save_license(key)?;
        self.status = Some(LicenseStatus::Activated);
        log::info!("board {} activated", self.identity.id);
        Ok(())
    }

    /// Current entitlement, computed from storage on first use and cached until
    /// [`invalidate`](Self::invalidate).
    pub fn status<S>(&mut self, storage: &mut S) -> LicenseStatus
    where
        S: Storage + ?Sized,
    {
        if let Some(status) = self.status {
            return status;
        }
        match storage.load_license() {
            Ok(stored) => {
                let status = match stored {
                    Some(key) if self.validate(&key) => LicenseStatus::Activated,
                    _ => LicenseStatus::NotActivated,
                };
                self.status = Some(status);
                status
            }
            Err(err) => {
                // Not cached so the next query retries the medium.
                log::warn!("license unreadable: {err}");
                LicenseStatus::NotActivated
            }
        }
    }

    pub fn invalidate(&mut self) {
        self.status = None;
    }

    /// Erase the stored key and drop the cached status.
    pub fn reset<S>(&mut self, storage: &mut S) -> Result<(), DeviceError>
    where
        S: Storage + ?Sized,
    {
        self.invalidate();
        storage.erase_license()?;
        Ok(())
    }
}
