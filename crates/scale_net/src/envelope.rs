//! Envelopes exchanged between controllers and the host.
//!
//! Field names on the wire are fixed (`UUID`, `command`, `data` inbound;
//! `Type`, `Message`, `Data`, `UUID`, `Context` outbound), so every field
//! carries an explicit `serde` rename. Optional fields are omitted rather
//! than sent as `null`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::NetError;

// ── Requests ────────────────────────────────────────────────────────────────

/// An inbound command envelope.
///
/// `command` is optional at the type level so that a request without one
/// still decodes and can be answered with an error reply carrying its
/// correlation id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Caller-chosen correlation id, echoed on the reply.
    #[serde(rename = "UUID", default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Command name, `[A-Za-z0-9]+`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Argument object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Request {
    /// Create a request for `command` with no arguments.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            uuid: None,
            command: Some(command.into()),
            data: None,
        }
    }

    /// Set the correlation id.
    #[must_use]
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    /// Set the argument object.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Check that `name` is a non-empty run of ASCII letters and digits.
///
/// # Errors
///
/// Returns [`NetError::InvalidCommandName`] otherwise.
pub fn validate_command_name(name: &str) -> Result<(), NetError> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(NetError::InvalidCommandName(name.to_string()))
    }
}

// ── Responses ───────────────────────────────────────────────────────────────

/// Discriminant of an outbound envelope. Serialised as its numeric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResponseType {
    /// The command ran.
    Success = 0,
    /// The request was rejected before running.
    Error = 1,
    /// The command ran and failed.
    Exception = 2,
    /// Unsolicited notification.
    Push = 3,
}

impl Serialize for ResponseType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for ResponseType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match u8::deserialize(deserializer)? {
            0 => Ok(Self::Success),
            1 => Ok(Self::Error),
            2 => Ok(Self::Exception),
            3 => Ok(Self::Push),
            other => Err(serde::de::Error::custom(format!(
                "unknown response type {other}"
            ))),
        }
    }
}

/// An outbound reply or push envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Envelope kind.
    #[serde(rename = "Type")]
    pub kind: ResponseType,
    /// Human-readable status text.
    #[serde(rename = "Message", default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Structured payload.
    #[serde(rename = "Data", default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Correlation id copied from the request.
    #[serde(rename = "UUID", default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Notification stream tag. Only set on pushes.
    #[serde(rename = "Context", default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Response {
    fn with_kind(kind: ResponseType, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: Some(message.into()),
            data: None,
            uuid: None,
            context: None,
        }
    }

    /// A success reply.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self::with_kind(ResponseType::Success, message)
    }

    /// A rejection reply.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_kind(ResponseType::Error, message)
    }

    /// A failure raised while running a command.
    #[must_use]
    pub fn exception(message: impl Into<String>) -> Self {
        Self::with_kind(ResponseType::Exception, message)
    }

    /// A push notification on stream `context`.
    #[must_use]
    pub fn push(context: impl Into<String>, message: impl Into<String>, data: Value) -> Self {
        Self {
            kind: ResponseType::Push,
            message: Some(message.into()),
            data: Some(data),
            uuid: None,
            context: Some(context.into()),
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach a correlation id.
    #[must_use]
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    /// Returns `true` for [`ResponseType::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.kind == ResponseType::Success
    }
}

// ── Payload types ───────────────────────────────────────────────────────────

/// One `(id, scale)` pair as it appears in command arguments, replies and the
/// persistence file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleEntry {
    /// Character id.
    pub id: u32,
    /// Scale factor.
    pub scale: f32,
}
