//! Message-level protocol each session runs.
//!
//! Frames go to the processing queue, control messages are applied
//! synchronously, anything outside `Active` is rejected before it is even
//! parsed. Per-message errors are reported to the client and never end the
//! connection.

use posestream_core::ErrorKind;
use thiserror::Error;
use tracing::{debug, warn};

use super::envelope::{self, ControlAction, EnvelopeError, InboundMessage, MessageType};
use crate::session::{ClientSession, SessionError, SessionState};

/// Why an inbound message was not applied.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Envelope could not be parsed.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    /// The session refused the message.
    #[error("{error}")]
    Session {
        /// Sequence of the rejected message, if known.
        sequence: Option<u64>,
        /// Underlying rejection.
        #[source]
        error: SessionError,
    },
    /// Envelope `type` not recognised.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),
}

impl ProtocolError {
    /// Wire error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Envelope(e) => e.kind(),
            Self::Session { error, .. } => error.kind(),
            Self::UnknownMessageType(_) => ErrorKind::UnknownMessageType,
        }
    }

    /// Sequence of the offending message, if known.
    pub fn sequence(&self) -> Option<u64> {
        match self {
            Self::Session { sequence, .. } => *sequence,
            Self::Envelope(_) | Self::UnknownMessageType(_) => None,
        }
    }

    fn session(sequence: Option<u64>, error: SessionError) -> Self {
        let sequence = match &error {
            SessionError::Sequence { got, .. } => Some(*got),
            _ => sequence,
        };
        Self::Session { sequence, error }
    }
}

/// What a successfully dispatched message did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatched {
    /// Frame queued.
    Enqueued {
        /// Sequence it was queued under.
        sequence: u64,
        /// Older frame evicted to make room.
        displaced: Option<u64>,
    },
    /// Control action applied.
    Control(ControlAction),
    /// Message of a server-to-client type; nothing to do.
    Ignored(MessageType),
}

/// Apply one inbound text message to `session`.
pub fn dispatch(session: &ClientSession, text: &str) -> Result<Dispatched, ProtocolError> {
    let state = session.state();
    if state != SessionState::Active {
        return Err(ProtocolError::session(None, SessionError::NotActive(state)));
    }

    match envelope::parse_inbound(text)? {
        InboundMessage::Frame {
            sequence,
            payload,
            timestamp,
        } => {
            let submitted = session
                .submit_frame(sequence, payload, timestamp)
                .map_err(|e| ProtocolError::session(sequence, e))?;
            Ok(Dispatched::Enqueued {
                sequence: submitted.sequence,
                displaced: submitted.displaced,
            })
        }
        InboundMessage::Control { action, sequence } => {
            session
                .apply_control(action)
                .map_err(|e| ProtocolError::session(sequence, e))?;
            Ok(Dispatched::Control(action))
        }
        InboundMessage::Result => Ok(Dispatched::Ignored(MessageType::Result)),
        InboundMessage::Error { detail } => {
            debug!(client_id = %session.id(), ?detail, "client reported an error");
            Ok(Dispatched::Ignored(MessageType::Error))
        }
        InboundMessage::Unknown(kind) => Err(ProtocolError::UnknownMessageType(kind)),
    }
}

/// Dispatch `text` and send whatever reply it calls for.
///
/// Control actions are acknowledged with a `control` envelope; rejected
/// messages get an `error` envelope, except unknown types which are only
/// logged.
pub fn handle_message(session: &ClientSession, text: &str) -> Result<Dispatched, ProtocolError> {
    let outcome = dispatch(session, text);
    match &outcome {
        Ok(Dispatched::Enqueued { sequence, displaced }) => {
            debug!(client_id = %session.id(), sequence, ?displaced, "frame queued");
        }
        Ok(Dispatched::Control(action)) => {
            debug!(client_id = %session.id(), action = action.as_str(), "control applied");
            if !session.send(envelope::control_message(*action, None)) {
                debug!(client_id = %session.id(), "control ack not delivered");
            }
        }
        Ok(Dispatched::Ignored(kind)) => {
            debug!(client_id = %session.id(), %kind, "ignoring server-bound message type");
        }
        Err(ProtocolError::UnknownMessageType(kind)) => {
            warn!(client_id = %session.id(), message_type = %kind, "unknown message type, ignoring");
        }
        Err(e) => {
            debug!(client_id = %session.id(), error = %e, kind = %e.kind(), "message rejected");
            let reply = envelope::error_message(e.kind(), &e.to_string(), e.sequence());
            if !session.send(reply) {
                debug!(client_id = %session.id(), "error reply not delivered");
            }
        }
    }
    outcome
}
