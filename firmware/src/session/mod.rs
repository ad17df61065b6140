//! Locked/Unlocked session owning the live key, the slot array and the pending secret.
//!
//! Both the button path and the host protocol drive the token exclusively through
//! [`SessionStateMachine`], so locking and timeout rules cannot diverge between them.
use alloc::{format, string::String};

use shared::vault::{SLOT_COUNT, SlotArray, VaultBlob, clamp_timeout};
use zeroize::Zeroizing;

use crate::crypto::CredentialVault;
use crate::error::{AuthError, DeviceError, SlotError, StateError};
use crate::storage::{Storage, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Locked,
    Unlocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockReason {
    Explicit,
    LongPress,
    IdleTimeout,
    Reset,
}

/// Decrypted secret waiting for the output collaborators.
pub struct PendingSecret {
    slot: usize,
    label: String,
    plaintext: Zeroizing<String>,
}

impl PendingSecret {
    pub fn slot(&self) -> usize {
        self.slot
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn plaintext(&self) -> &str {
        &self.plaintext
    }
}

impl core::fmt::Debug for PendingSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PendingSecret")
            .field("slot", &self.slot)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Non-sensitive view of the session reported by `STATUS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub slots: [bool; SLOT_COUNT],
    pub timeout_secs: u32,
}

#[derive(Debug)]
pub struct SessionStateMachine {
    vault: CredentialVault,
    phase: Phase,
    master_hash: Option<String>,
    slots: SlotArray,
    timeout_secs: u32,
    default_timeout_secs: u32,
    last_activity_ms: u64,
    pending: Option<PendingSecret>,
    emitting: bool,
    deferred_lock: Option<LockReason>,
    /// Set when the stored vault could not be loaded. Nothing is written back until a reload
    /// succeeds or a factory reset discards the old image.
    load_error: Option<StorageError>,
}

impl SessionStateMachine {
    pub fn new(vault: CredentialVault, default_timeout_secs: u32) -> Self {
        let default_timeout_secs = clamp_timeout(default_timeout_secs as i64);
        Self {
            vault,
            phase: Phase::Locked,
            master_hash: None,
            slots: Default::default(),
            timeout_secs: default_timeout_secs,
            default_timeout_secs,
            last_activity_ms: 0,
            pending: None,
            emitting: false,
            deferred_lock: None,
            load_error: None,
        }
    }

    /// Adopt a blob loaded at boot. The session stays locked.
    pub fn restore(&mut self, blob: VaultBlob) {
        self.apply_lock(LockReason::Reset);
        self.master_hash = blob.master_hash;
        self.slots = blob.slots;
        self.timeout_secs = clamp_timeout(blob.auto_lock_timeout_secs as i64);
        self.load_error = None;
    }

    /// Record that the stored vault exists but could not be read at boot.
    ///
    /// The session then refuses to bootstrap or persist, so a transient read failure can never
    /// replace the owner's vault with a fresh one.
    pub fn mark_unreadable(&mut self, err: StorageError) {
        self.apply_lock(LockReason::Reset);
        self.load_error = Some(err);
    }

    pub fn load_error(&self) -> Option<StorageError> {
        self.load_error
    }

    /// Persistable image of the current vault state.
    pub fn blob(&self) -> VaultBlob {
        VaultBlob {
            master_hash: self.master_hash.clone(),
            slots: self.slots.clone(),
            auto_lock_timeout_secs: self.timeout_secs,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_unlocked(&self) -> bool {
        self.phase == Phase::Unlocked
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.master_hash.is_some()
    }

    pub fn timeout_secs(&self) -> u32 {
        self.timeout_secs
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_emitting(&self) -> bool {
        self.emitting
    }

    pub fn slot_flags(&self) -> [bool; SLOT_COUNT] {
        core::array::from_fn(|index| self.slots[index].is_some())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            slots: self.slot_flags(),
            timeout_secs: self.timeout_secs,
        }
    }

    /// True when the key/phase pairing has been broken.
    pub fn invariant_breached(&self) -> bool {
        self.vault.has_key() != self.is_unlocked()
    }

    pub fn touch(&mut self, now_ms: u64) {
        self.last_activity_ms = now_ms;
    }

    /// Unlock with `passphrase`, bootstrapping the vault when no master credential exists yet.
    pub fn unlock<S>(&mut self, passphrase: &str, now_ms: u64, storage: &mut S) -> Result<(), DeviceError>
    where
        S: Storage + ?Sized,
    {
        if passphrase.is_empty() {
            return Err(AuthError::WrongPassphrase.into());
        }
        self.ensure_loaded(storage)?;
        let candidate = CredentialVault::hash_password(passphrase);

        let Some(stored) = self.master_hash.as_deref() else {
            self.vault.clear_key();
            self.vault.derive_key(passphrase);
            self.master_hash = Some(candidate);
            self.phase = Phase::Unlocked;
            self.touch(now_ms);
            log::info!("vault bootstrapped with a new master credential");
            return self.persist(storage);
        };

        if stored != candidate {
            if self.phase == Phase::Locked {
                self.vault.clear_key();
            }
            log::warn!("unlock rejected");
            return Err(AuthError::WrongPassphrase.into());
        }

        if self.phase == Phase::Locked {
            self.vault.derive_key(passphrase);
            self.phase = Phase::Unlocked;
            log::info!("session unlocked");
        }
        self.touch(now_ms);
        Ok(())
    }

    /// Lock the session, or queue the lock while an emission is in flight.
    ///
    /// Returns `true` when the lock was applied immediately.
    pub fn lock(&mut self, reason: LockReason) -> bool {
        if self.emitting {
            log::debug!("lock ({reason:?}) deferred until emission completes");
            self.deferred_lock = Some(reason);
            return false;
        }
        self.apply_lock(reason);
        true
    }

    fn apply_lock(&mut self, reason: LockReason) {
        if self.phase == Phase::Unlocked {
            log::info!("session locked ({reason:?})");
        }
        self.vault.clear_key();
        self.pending = None;
        self.phase = Phase::Locked;
    }

    /// Auto-lock once idle time strictly exceeds the timeout. Returns `true` when a lock was
    /// requested by this call.
    pub fn check_idle(&mut self, now_ms: u64) -> bool {
        if self.phase != Phase::Unlocked || self.deferred_lock.is_some() {
            return false;
        }
        let idle = now_ms.saturating_sub(self.last_activity_ms);
        if idle > u64::from(self.timeout_secs) * 1_000 {
            self.lock(LockReason::IdleTimeout);
            return true;
        }
        false
    }

    pub fn add_secret<S>(&mut self, slot: i64, plaintext: &str, storage: &mut S) -> Result<(), DeviceError>
    where
        S: Storage + ?Sized,
    {
        self.require_unlocked()?;
        let index = slot_index(slot)?;
        let sealed = self.vault.encrypt(plaintext.as_bytes())?;
        self.slots[index] = Some(sealed);
        log::info!("slot {index} stored");
        self.persist(storage)
    }

    pub fn delete_secret<S>(&mut self, slot: i64, storage: &mut S) -> Result<(), DeviceError>
    where
        S: Storage + ?Sized,
    {
        self.require_unlocked()?;
        let index = slot_index(slot)?;
        self.slots[index] = None;
        log::info!("slot {index} cleared");
        self.persist(storage)
    }

    /// Decrypt a slot into the pending secret, replacing any earlier one.
    pub fn queue_secret(&mut self, slot: i64) -> Result<(), DeviceError> {
        self.require_unlocked()?;
        let index = slot_index(slot)?;
        let sealed = self.slots[index].as_ref().ok_or(SlotError::Empty)?;
        let bytes = self.vault.decrypt(sealed)?;
        // Garbage from a damaged slot is still typed, never rejected.
        let plaintext = Zeroizing::new(String::from_utf8_lossy(&bytes).into_owned());
        self.pending = Some(PendingSecret {
            slot: index,
            label: format!("slot {index}"),
            plaintext,
        });
        Ok(())
    }

    pub fn take_pending(&mut self) -> Option<PendingSecret> {
        self.pending.take()
    }

    /// Hand the pending secret to the emitter. Locks requested until
    /// [`finish_emission`](Self::finish_emission) are deferred.
    pub fn begin_emission(&mut self) -> Option<PendingSecret> {
        let pending = self.take_pending()?;
        self.emitting = true;
        Some(pending)
    }

    /// End an emission and apply any lock that arrived meanwhile.
    pub fn finish_emission(&mut self) -> Option<LockReason> {
        self.emitting = false;
        let reason = self.deferred_lock.take()?;
        self.apply_lock(reason);
        Some(reason)
    }

    /// Clamp and persist a new auto-lock timeout. Allowed in either phase.
    pub fn set_timeout<S>(&mut self, seconds: i64, storage: &mut S) -> Result<u32, DeviceError>
    where
        S: Storage + ?Sized,
    {
        self.ensure_loaded(storage)?;
        self.timeout_secs = clamp_timeout(seconds);
        self.persist(storage)?;
        Ok(self.timeout_secs)
    }

    /// Forget the master credential and every slot, then lock.
    pub fn factory_reset<S>(&mut self, storage: &mut S) -> Result<(), DeviceError>
    where
        S: Storage + ?Sized,
    {
        self.emitting = false;
        self.deferred_lock = None;
        self.apply_lock(LockReason::Reset);
        self.master_hash = None;
        self.slots = Default::default();
        self.timeout_secs = self.default_timeout_secs;
        self.load_error = None;
        log::warn!("factory reset");
        self.persist(storage)
    }

    /// Drop the key and pending secret without touching the vault image.
    pub fn wipe_volatile(&mut self) {
        self.vault.clear_key();
        self.pending = None;
        self.emitting = false;
        self.deferred_lock = None;
        self.phase = Phase::Locked;
    }

    fn require_unlocked(&self) -> Result<(), DeviceError> {
        match self.phase {
            Phase::Unlocked => Ok(()),
            Phase::Locked => Err(StateError::LockedOperationDenied.into()),
        }
    }

    /// Retry a failed boot-time load. An absent vault clears the error; a readable one is
    /// adopted; any other failure is reported again.
    fn ensure_loaded<S>(&mut self, storage: &mut S) -> Result<(), DeviceError>
    where
        S: Storage + ?Sized,
    {
        if self.load_error.is_none() {
            return Ok(());
        }
        match storage.load() {
            Ok(Some(blob)) => {
                log::info!("stored vault readable again");
                self.restore(blob);
                Ok(())
            }
            Ok(None) => {
                self.load_error = None;
                Ok(())
            }
            Err(err) => {
                log::warn!("stored vault still unreadable: {err}");
                self.load_error = Some(err);
                Err(err.into())
            }
        }
    }

    fn persist<S>(&self, storage: &mut S) -> Result<(), DeviceError>
    where
        S: Storage + ?Sized,
    {
        if let Some(err) = self.load_error {
            log::error!("refusing to overwrite unreadable vault");
            return Err(err.into());
        }
        storage.save(&self.blob()).map_err(|err| {
            log::error!("vault not persisted: {err}");
            DeviceError::from(err)
        })
    }
}

fn slot_index(slot: i64) -> Result<usize, SlotError> {
    usize::try_from(slot)
        .ok()
        .filter(|index| *index < SLOT_COUNT)
        .ok_or(SlotError::InvalidIndex)
}
