//! Session protocol: envelope parsing, outbound envelope builders and the
//! per-message dispatch state machine.

pub mod dispatch;
pub mod envelope;

pub use dispatch::{Dispatched, ProtocolError, dispatch, handle_message};
pub use envelope::{ControlAction, EnvelopeError, InboundMessage, MessageType};
