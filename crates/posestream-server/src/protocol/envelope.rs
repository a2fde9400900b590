//! Wire envelopes.
//!
//! Every message is one JSON object:
//!
//! ```json
//! { "type": "frame", "sequence": 12, "payload": "data:image/jpeg;base64,...", "timestamp": 1700000000123 }
//! { "type": "control", "payload": "stop" }
//! { "type": "error", "kind": "sequence_error", "detail": "...", "sequence": 12, "timestamp": ... }
//! ```

use std::fmt;

use posestream_core::{ClientId, ErrorKind};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::error;

/// Envelope `type` values understood by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Client → server image frame.
    Frame,
    /// Lifecycle control, both directions.
    Control,
    /// Server → client landmark result.
    Result,
    /// Server → client error report.
    Error,
}

impl MessageType {
    /// Wire string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Frame => "frame",
            Self::Control => "control",
            Self::Result => "result",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Control values carried in a `control` envelope's `payload`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    /// Begin streaming. Sessions are active on connect, so this is an ack.
    Start,
    /// End the session.
    Stop,
    /// Zero the session counters.
    Reset,
}

impl ControlAction {
    /// Wire string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Reset => "reset",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "start" => Some(Self::Start),
            "stop" => Some(Self::Stop),
            "reset" => Some(Self::Reset),
            _ => None,
        }
    }
}

/// A decoded inbound envelope.
///
/// Closed set of kinds with an explicit arm for anything else, so dispatch
/// is a total match.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundMessage {
    /// Image frame.
    Frame {
        /// Client sequence, if given.
        sequence: Option<u64>,
        /// Encoded image (possibly empty).
        payload: String,
        /// Client capture time, milliseconds.
        timestamp: Option<i64>,
    },
    /// Control action.
    Control {
        /// Requested action.
        action: ControlAction,
        /// Client sequence, if given.
        sequence: Option<u64>,
    },
    /// A `result` sent by the client. Server-to-client only; ignored.
    Result,
    /// An `error` sent by the client. Logged and ignored.
    Error {
        /// Reported detail, if any.
        detail: Option<String>,
    },
    /// Any other `type`.
    Unknown(String),
}

/// Envelope-level parse failures.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Not JSON, not an object, or missing `type`.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    /// `frame` payload is not a string.
    #[error("frame payload must be a string")]
    FramePayload,
    /// `control` payload missing or not a string.
    #[error("control payload must be one of start, stop, reset")]
    MissingControl,
    /// `control` payload not recognised.
    #[error("unknown control action: {0}")]
    UnknownControl(String),
}

impl EnvelopeError {
    /// Wire error kind.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::DecodeError
    }
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    message_type: String,
    #[serde(default)]
    sequence: Option<u64>,
    #[serde(default)]
    payload: Option<Value>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    timestamp: Option<i64>,
    #[serde(default)]
    detail: Option<String>,
}

/// Browsers send `performance.now()`-style floats as often as integers.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))))
}

/// Parse one inbound text message.
pub fn parse_inbound(text: &str) -> Result<InboundMessage, EnvelopeError> {
    let raw: RawEnvelope = serde_json::from_str(text)?;
    let message = match raw.message_type.as_str() {
        "frame" => {
            let payload = match raw.payload {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s,
                Some(_) => return Err(EnvelopeError::FramePayload),
            };
            InboundMessage::Frame {
                sequence: raw.sequence,
                payload,
                timestamp: raw.timestamp,
            }
        }
        "control" => {
            let Some(Value::String(value)) = raw.payload else {
                return Err(EnvelopeError::MissingControl);
            };
            let action = ControlAction::parse(&value).ok_or(EnvelopeError::UnknownControl(value))?;
            InboundMessage::Control {
                action,
                sequence: raw.sequence,
            }
        }
        "result" => InboundMessage::Result,
        "error" => InboundMessage::Error { detail: raw.detail },
        _ => InboundMessage::Unknown(raw.message_type),
    };
    Ok(message)
}

#[derive(Serialize)]
struct ErrorWire<'a> {
    #[serde(rename = "type")]
    message_type: MessageType,
    kind: ErrorKind,
    detail: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence: Option<u64>,
    timestamp: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ControlWire<'a> {
    #[serde(rename = "type")]
    message_type: MessageType,
    payload: ControlAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<&'a ClientId>,
    timestamp: i64,
}

/// Build an `error` envelope.
pub fn error_message(kind: ErrorKind, detail: &str, sequence: Option<u64>) -> String {
    let wire = ErrorWire {
        message_type: MessageType::Error,
        kind,
        detail,
        sequence,
        timestamp: chrono::Utc::now().timestamp_millis(),
    };
    serde_json::to_string(&wire).unwrap_or_else(|e| {
        error!(error = %e, %kind, "failed to serialize error envelope");
        format!(r#"{{"type":"error","kind":"{kind}","detail":"internal error"}}"#)
    })
}

/// Build a `control` envelope. The greeting carries the client id.
pub fn control_message(action: ControlAction, client_id: Option<&ClientId>) -> String {
    let wire = ControlWire {
        message_type: MessageType::Control,
        payload: action,
        client_id,
        timestamp: chrono::Utc::now().timestamp_millis(),
    };
    serde_json::to_string(&wire).unwrap_or_else(|e| {
        error!(error = %e, action = action.as_str(), "failed to serialize control envelope");
        format!(r#"{{"type":"control","payload":"{}"}}"#, action.as_str())
    })
}
