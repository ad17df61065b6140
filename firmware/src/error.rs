//! Error taxonomy shared by every intent handler.
//!
//! Each family maps onto one wire [`ErrorCode`]; none of them is allowed to stop the control loop.
use core::fmt;

use shared::schema::ErrorCode;

use crate::crypto::VaultError;
use crate::storage::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationError {
    InvalidKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    WrongPassphrase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    LockedOperationDenied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotError {
    InvalidIndex,
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    ParseFailure,
    UnknownCommand,
    BufferOverflow,
}

/// Any failure raised while servicing an intent from a button or the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    Activation(ActivationError),
    Auth(AuthError),
    State(StateError),
    Slot(SlotError),
    Storage(StorageError),
    Protocol(ProtocolError),
    Crypto(VaultError),
}

impl DeviceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DeviceError::Activation(_) => ErrorCode::ActivationError,
            DeviceError::Auth(_) => ErrorCode::AuthError,
            DeviceError::State(_) => ErrorCode::StateError,
            DeviceError::Slot(_) => ErrorCode::SlotError,
            DeviceError::Storage(_) => ErrorCode::StorageError,
            DeviceError::Protocol(_) => ErrorCode::ProtocolError,
            DeviceError::Crypto(_) => ErrorCode::CryptoError,
        }
    }
}

impl From<ActivationError> for DeviceError {
    fn from(value: ActivationError) -> Self {
        DeviceError::Activation(value)
    }
}

impl From<AuthError> for DeviceError {
    fn from(value: AuthError) -> Self {
        DeviceError::Auth(value)
    }
}

impl From<StateError> for DeviceError {
    fn from(value: StateError) -> Self {
        DeviceError::State(value)
    }
}

impl From<SlotError> for DeviceError {
    fn from(value: SlotError) -> Self {
        DeviceError::Slot(value)
    }
}

impl From<StorageError> for DeviceError {
    fn from(value: StorageError) -> Self {
        DeviceError::Storage(value)
    }
}

impl From<ProtocolError> for DeviceError {
    fn from(value: ProtocolError) -> Self {
        DeviceError::Protocol(value)
    }
}

impl From<VaultError> for DeviceError {
    fn from(value: VaultError) -> Self {
        DeviceError::Crypto(value)
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Activation(ActivationError::InvalidKey) => write!(f, "invalid activation key"),
            DeviceError::Auth(AuthError::WrongPassphrase) => write!(f, "wrong passphrase"),
            DeviceError::State(StateError::LockedOperationDenied) => write!(f, "device is locked"),
            DeviceError::Slot(SlotError::InvalidIndex) => write!(f, "invalid slot"),
            DeviceError::Slot(SlotError::Empty) => write!(f, "slot is empty"),
            DeviceError::Storage(err) => write!(f, "{err}"),
            DeviceError::Protocol(ProtocolError::ParseFailure) => write!(f, "malformed request"),
            DeviceError::Protocol(ProtocolError::UnknownCommand) => write!(f, "unknown command"),
            DeviceError::Protocol(ProtocolError::BufferOverflow) => {
                write!(f, "request exceeds line buffer")
            }
            DeviceError::Crypto(err) => write!(f, "{err}"),
        }
    }
}

impl core::error::Error for DeviceError {}

/// Unrecoverable failure reported by a hardware collaborator.
///
/// Unlike [`DeviceError`] this ends normal operation: the device enters its terminal fault state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareFault {
    pub source: &'static str,
}

impl HardwareFault {
    pub const fn new(source: &'static str) -> Self {
        Self { source }
    }
}

impl fmt::Display for HardwareFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hardware fault in {}", self.source)
    }
}

impl core::error::Error for HardwareFault {}
