//! Client sessions: lifecycle, counters and frame admission.

pub mod client;
pub mod counters;
pub mod state;

pub use client::{ClientSession, SessionContext, SessionError, SessionInfo, Submitted};
pub use counters::{CounterSnapshot, SessionCounters};
pub use state::{CloseReason, Lifecycle, SessionState};
