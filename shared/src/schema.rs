//! Line-delimited JSON protocol spoken between the host and the token.
//!
//! Every request is one JSON object terminated by `\n` whose `type` field names the command.
//! Every response is one JSON object with `status` set to `ok` or `error`.
use alloc::{
    string::{String, ToString},
    vec::Vec,
};
use core::fmt;
use serde::{Deserialize, Deserializer, Serialize, de::Error as _};
use serde_json::{Number, Value};

use crate::license::LicenseStatus;

/// Command names understood by the firmware.
pub const KNOWN_COMMANDS: &[&str] = &[
    "PING",
    "GET_ID",
    "ACTIVATE",
    "UNLOCK",
    "LOCK",
    "STATUS",
    "ADD_PASSWORD",
    "DELETE_PASSWORD",
    "TYPE_PASSWORD",
    "SET_TIMEOUT",
    "RESET",
];

/// Message returned for a `type` that is not in [`KNOWN_COMMANDS`].
pub const UNKNOWN_COMMAND_MESSAGE: &str = "unknown command";

/// Requests issued by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostRequest {
    Ping,
    GetId,
    Activate { key: String },
    Unlock { password: String },
    Lock,
    Status,
    AddPassword {
        #[serde(deserialize_with = "saturating_integer")]
        slot: i64,
        password: String,
    },
    DeletePassword {
        #[serde(deserialize_with = "saturating_integer")]
        slot: i64,
    },
    TypePassword {
        #[serde(deserialize_with = "saturating_integer")]
        slot: i64,
    },
    SetTimeout {
        #[serde(deserialize_with = "saturating_integer")]
        timeout: i64,
    },
    Reset,
}

impl HostRequest {
    /// Wire name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            HostRequest::Ping => "PING",
            HostRequest::GetId => "GET_ID",
            HostRequest::Activate { .. } => "ACTIVATE",
            HostRequest::Unlock { .. } => "UNLOCK",
            HostRequest::Lock => "LOCK",
            HostRequest::Status => "STATUS",
            HostRequest::AddPassword { .. } => "ADD_PASSWORD",
            HostRequest::DeletePassword { .. } => "DELETE_PASSWORD",
            HostRequest::TypePassword { .. } => "TYPE_PASSWORD",
            HostRequest::SetTimeout { .. } => "SET_TIMEOUT",
            HostRequest::Reset => "RESET",
        }
    }
}

/// Accept any integral JSON number, saturating values outside the `i64` range.
///
/// Out-of-range slots and timeouts are then rejected or clamped by the device instead of
/// failing to parse. Numbers with a fractional part are still malformed.
fn saturating_integer<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let number = Number::deserialize(deserializer)?;
    if let Some(value) = number.as_i64() {
        return Ok(value);
    }
    if number.as_u64().is_some() {
        return Ok(i64::MAX);
    }
    match number.as_f64() {
        Some(value) if value.is_finite() && value % 1.0 == 0.0 => Ok(value as i64),
        _ => Err(D::Error::custom(format_args!("expected an integer, got {number}"))),
    }
}

/// Reasons a request line could not be turned into a [`HostRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Not a JSON object with a string `type`, or a known command with invalid fields.
    Malformed(String),
    /// Well-formed object whose `type` is not a known command.
    UnknownCommand(String),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::Malformed(reason) => write!(f, "malformed request: {reason}"),
            RequestError::UnknownCommand(name) => write!(f, "unknown command {name}"),
        }
    }
}

impl core::error::Error for RequestError {}

/// Decode one request line (without the trailing newline).
pub fn decode_host_request(line: &[u8]) -> Result<HostRequest, RequestError> {
    let value: Value =
        serde_json::from_slice(line).map_err(|err| RequestError::Malformed(err.to_string()))?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| RequestError::Malformed("missing string field `type`".into()))?;
    if !KNOWN_COMMANDS.contains(&kind) {
        return Err(RequestError::UnknownCommand(kind.into()));
    }
    serde_json::from_value(value).map_err(|err| RequestError::Malformed(err.to_string()))
}

/// Encode a request as a newline-terminated line.
pub fn encode_host_request(request: &HostRequest) -> Result<Vec<u8>, serde_json::Error> {
    let mut line = serde_json::to_vec(request)?;
    line.push(b'\n');
    Ok(line)
}

/// Outcome marker carried by every response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    #[default]
    Ok,
    Error,
}

/// Stable error families reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ActivationError,
    AuthError,
    StateError,
    SlotError,
    StorageError,
    ProtocolError,
    CryptoError,
}

/// Response object written back to the host.
///
/// Only the fields relevant to the answered command are present on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceResponse {
    pub status: ResponseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<LicenseStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation_request: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unlocked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slots: Option<Vec<bool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
}

impl DeviceResponse {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn error(code: Option<ErrorCode>, message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            code,
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn unknown_command() -> Self {
        Self::error(None, UNKNOWN_COMMAND_MESSAGE)
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }

    pub fn with_timeout(mut self, timeout: u32) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Encode a response as a newline-terminated line.
pub fn encode_device_response(response: &DeviceResponse) -> Result<Vec<u8>, serde_json::Error> {
    let mut line = serde_json::to_vec(response)?;
    line.push(b'\n');
    Ok(line)
}

/// Decode one response line.
pub fn decode_device_response(line: &[u8]) -> Result<DeviceResponse, serde_json::Error> {
    serde_json::from_slice(line)
}
