//! Wire-level error taxonomy.
//!
//! Every error surfaced to a client carries one of these kinds in the `kind`
//! field of an `error` envelope. Domain error enums in the server map onto
//! them via `kind()`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable error kind sent to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed, truncated or unsupported frame payload (or envelope).
    DecodeError,
    /// Out-of-order or duplicate frame sequence number.
    SequenceError,
    /// Envelope `type` not recognised.
    UnknownMessageType,
    /// A session with the same client id is already registered.
    DuplicateId,
    /// The registry is at its configured session limit.
    AtCapacity,
    /// Message arrived after the session left the `Active` state.
    SessionClosed,
    /// The session's detector became unusable.
    DetectorFatal,
}

impl ErrorKind {
    /// Snake-case wire string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DecodeError => "decode_error",
            Self::SequenceError => "sequence_error",
            Self::UnknownMessageType => "unknown_message_type",
            Self::DuplicateId => "duplicate_id",
            Self::AtCapacity => "at_capacity",
            Self::SessionClosed => "session_closed",
            Self::DetectorFatal => "detector_fatal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ErrorKind; 7] = [
        ErrorKind::DecodeError,
        ErrorKind::SequenceError,
        ErrorKind::UnknownMessageType,
        ErrorKind::DuplicateId,
        ErrorKind::AtCapacity,
        ErrorKind::SessionClosed,
        ErrorKind::DetectorFatal,
    ];

    #[test]
    fn serde_matches_as_str() {
        for kind in ALL {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }

    #[test]
    fn wire_strings_are_snake_case() {
        for kind in ALL {
            assert!(
                kind.as_str().chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "kind '{kind}' must be snake_case"
            );
        }
    }
}
