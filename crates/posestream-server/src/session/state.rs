//! Session lifecycle: `Connecting → Active → Draining → Closed`.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Lifecycle state of a client session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, not yet registered.
    Connecting,
    /// Registered with a running processing loop. The only state that
    /// accepts frames and control messages.
    Active,
    /// Shutting down: no new frames, queue released, deregistering.
    Draining,
    /// Terminal.
    Closed,
}

impl SessionState {
    /// Snake-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Draining => "draining",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session left the `Active` state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// Transport closed or errored.
    ClientDisconnect,
    /// Client sent `control: stop`.
    ClientStop,
    /// The outbound channel to the transport is gone.
    SendFailed,
    /// Detector became unusable.
    DetectorFatal(String),
    /// No pong within the heartbeat timeout.
    HeartbeatTimeout,
    /// Process is shutting down.
    ServerShutdown,
    /// Registry refused the session.
    RegistrationFailed,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientDisconnect => f.write_str("client disconnected"),
            Self::ClientStop => f.write_str("client requested stop"),
            Self::SendFailed => f.write_str("outbound send failed"),
            Self::DetectorFatal(reason) => write!(f, "detector fatal: {reason}"),
            Self::HeartbeatTimeout => f.write_str("heartbeat timeout"),
            Self::ServerShutdown => f.write_str("server shutdown"),
            Self::RegistrationFailed => f.write_str("registration failed"),
        }
    }
}

/// Shared lifecycle flags for one session.
///
/// The drain token is a child of the server shutdown token, so a server-wide
/// shutdown drains every session without touching each one.
#[derive(Debug)]
pub struct Lifecycle {
    state: Mutex<SessionState>,
    reason: Mutex<Option<CloseReason>>,
    drain: CancellationToken,
}

impl Lifecycle {
    /// New lifecycle in `Connecting`, drained when `parent` is cancelled.
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            state: Mutex::new(SessionState::Connecting),
            reason: Mutex::new(None),
            drain: parent.child_token(),
        }
    }

    /// Current state. An `Active` session whose drain token fired reports
    /// `Draining`.
    pub fn state(&self) -> SessionState {
        let state = *self.state.lock();
        if state == SessionState::Active && self.drain.is_cancelled() {
            SessionState::Draining
        } else {
            state
        }
    }

    /// `Connecting → Active`. Returns `false` from any other state.
    pub fn activate(&self) -> bool {
        let mut state = self.state.lock();
        if *state == SessionState::Connecting && !self.drain.is_cancelled() {
            *state = SessionState::Active;
            true
        } else {
            false
        }
    }

    /// Enter `Draining` and fire the drain token.
    ///
    /// Only the first caller's reason is kept. Returns `true` if this call
    /// performed the transition.
    pub fn begin_drain(&self, reason: CloseReason) -> bool {
        let transitioned = {
            let mut state = self.state.lock();
            match *state {
                SessionState::Connecting | SessionState::Active => {
                    *state = SessionState::Draining;
                    true
                }
                SessionState::Draining | SessionState::Closed => false,
            }
        };
        if transitioned {
            let mut stored = self.reason.lock();
            if stored.is_none() {
                *stored = Some(reason);
            }
        }
        self.drain.cancel();
        transitioned
    }

    /// Enter `Closed`. Idempotent.
    pub fn finish(&self) {
        *self.state.lock() = SessionState::Closed;
        self.drain.cancel();
    }

    /// Why the session is draining, if known.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.reason.lock().clone()
    }

    /// Token fired on drain (or server shutdown).
    pub fn drain_token(&self) -> CancellationToken {
        self.drain.clone()
    }

    /// Resolves once the session starts draining.
    pub async fn drained(&self) {
        self.drain.cancelled().await;
    }
}
