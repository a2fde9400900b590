//! A connected client: identity, lifecycle, counters and its processing loop.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use posestream_core::{ClientId, DetectorFactory, ErrorKind};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::counters::{CounterSnapshot, SessionCounters};
use super::state::{CloseReason, Lifecycle, SessionState};
use crate::processing::job::FrameJob;
use crate::processing::pipeline::{LoopContext, ProcessingLoop};
use crate::protocol::envelope::ControlAction;
use crate::registry::{ConnectionRegistry, RegistryError};

/// Errors raised while admitting messages into a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session is not `Active`.
    #[error("session is {0}")]
    NotActive(SessionState),
    /// Sequence number did not increase.
    #[error("sequence {got} does not follow {last}")]
    Sequence {
        /// Sequence carried by the rejected frame.
        got: u64,
        /// Last accepted sequence.
        last: u64,
    },
    /// Frame without image data.
    #[error("frame payload is empty")]
    EmptyPayload,
    /// Registration refused.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// The detector factory could not produce an instance.
    #[error("detector unavailable: {0}")]
    DetectorUnavailable(String),
}

impl SessionError {
    /// Wire error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotActive(_) => ErrorKind::SessionClosed,
            Self::Sequence { .. } => ErrorKind::SequenceError,
            Self::EmptyPayload => ErrorKind::DecodeError,
            Self::Registry(e) => e.kind(),
            Self::DetectorUnavailable(_) => ErrorKind::DetectorFatal,
        }
    }
}

/// Everything a new session needs from the server.
#[derive(Clone)]
pub struct SessionContext {
    /// Shared session directory.
    pub registry: Arc<ConnectionRegistry>,
    /// Builds one detector per session.
    pub factory: Arc<dyn DetectorFactory>,
    /// Pending frames per session.
    pub queue_capacity: usize,
    /// Server-wide shutdown token; session drain tokens are its children.
    pub shutdown: CancellationToken,
}

/// Accepted frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Submitted {
    /// Sequence the frame was queued under.
    pub sequence: u64,
    /// Sequence of the job evicted to make room, if any.
    pub displaced: Option<u64>,
}

/// Read-only view served by `/sessions`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Client id.
    pub client_id: ClientId,
    /// Lifecycle state.
    pub state: SessionState,
    /// When the connection was accepted.
    pub created_at: DateTime<Utc>,
    /// Frames waiting for the detector.
    pub queue_depth: usize,
    /// Counter snapshot.
    pub counters: CounterSnapshot,
}

/// One connected client.
///
/// Owned by its transport task; the registry only holds a weak reference.
pub struct ClientSession {
    id: ClientId,
    created_at: DateTime<Utc>,
    lifecycle: Arc<Lifecycle>,
    counters: Arc<SessionCounters>,
    processing: ProcessingLoop,
    outbound: mpsc::Sender<Arc<String>>,
    last_sequence: Mutex<Option<u64>>,
    registry: Arc<ConnectionRegistry>,
}

impl ClientSession {
    /// Create a session in `Connecting`. Results and replies go to `outbound`.
    pub fn new(id: ClientId, ctx: &SessionContext, outbound: mpsc::Sender<Arc<String>>) -> Arc<Self> {
        let lifecycle = Arc::new(Lifecycle::new(&ctx.shutdown));
        let counters = Arc::new(SessionCounters::new());
        let processing = ProcessingLoop::new(
            ctx.queue_capacity,
            counters.clone(),
            ctx.factory.clone(),
            lifecycle.drain_token(),
        );
        Arc::new(Self {
            id,
            created_at: Utc::now(),
            lifecycle,
            counters,
            processing,
            outbound,
            last_sequence: Mutex::new(None),
            registry: ctx.registry.clone(),
        })
    }

    /// Client id.
    pub fn id(&self) -> &ClientId {
        &self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    /// Shared lifecycle flags.
    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    /// Counter snapshot.
    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    /// Frames waiting for the detector.
    pub fn queue_depth(&self) -> usize {
        self.processing.queue_depth()
    }

    /// Register and start processing: `Connecting → Active`.
    ///
    /// On failure the session ends up `Closed` and any registry entry it
    /// created is removed again.
    pub fn activate(self: &Arc<Self>) -> Result<(), SessionError> {
        if let Err(e) = self.registry.register(self.id.clone(), self) {
            warn!(client_id = %self.id, error = %e, "registration refused");
            let _ = self.lifecycle.begin_drain(CloseReason::RegistrationFailed);
            self.lifecycle.finish();
            return Err(e.into());
        }

        let ctx = LoopContext {
            client_id: self.id.clone(),
            outbound: self.outbound.clone(),
            lifecycle: self.lifecycle.clone(),
        };
        if let Err(e) = self.processing.start(ctx) {
            warn!(client_id = %self.id, error = %e, "detector unavailable");
            self.close(CloseReason::DetectorFatal(e.to_string()));
            return Err(SessionError::DetectorUnavailable(e.to_string()));
        }

        if !self.lifecycle.activate() {
            let state = self.lifecycle.state();
            self.close(CloseReason::ServerShutdown);
            return Err(SessionError::NotActive(state));
        }
        info!(client_id = %self.id, "session active");
        Ok(())
    }

    /// Admit a frame into the processing queue.
    ///
    /// `sequence` must be strictly greater than the last accepted one; when
    /// absent, the next number is assigned. Rejections leave counters and
    /// queue untouched.
    pub fn submit_frame(
        &self,
        sequence: Option<u64>,
        payload: String,
        timestamp: Option<i64>,
    ) -> Result<Submitted, SessionError> {
        let state = self.lifecycle.state();
        if state != SessionState::Active {
            return Err(SessionError::NotActive(state));
        }
        if payload.trim().is_empty() {
            return Err(SessionError::EmptyPayload);
        }

        let mut last = self.last_sequence.lock();
        let sequence = match (sequence, *last) {
            (Some(got), Some(prev)) if got <= prev => {
                return Err(SessionError::Sequence { got, last: prev });
            }
            (Some(got), _) => got,
            (None, Some(prev)) => prev.checked_add(1).ok_or(SessionError::Sequence {
                got: prev,
                last: prev,
            })?,
            (None, None) => 1,
        };
        *last = Some(sequence);

        let displaced = self
            .processing
            .submit(FrameJob::new(sequence, payload, timestamp))
            .map(|job| job.sequence);
        drop(last);

        if let Some(dropped) = displaced {
            debug!(client_id = %self.id, sequence = dropped, "frame displaced by newer frame");
        }
        Ok(Submitted { sequence, displaced })
    }

    /// Apply a control action. Only valid while `Active`.
    pub fn apply_control(&self, action: ControlAction) -> Result<(), SessionError> {
        let state = self.lifecycle.state();
        if state != SessionState::Active {
            return Err(SessionError::NotActive(state));
        }
        match action {
            ControlAction::Start => {}
            ControlAction::Stop => {
                let _ = self.lifecycle.begin_drain(CloseReason::ClientStop);
            }
            ControlAction::Reset => {
                self.counters.reset();
                debug!(client_id = %self.id, "counters reset");
            }
        }
        Ok(())
    }

    /// Drain and close: stop accepting frames, abandon in-flight detection,
    /// release queued jobs, deregister, enter `Closed`. Idempotent.
    pub fn close(&self, reason: CloseReason) {
        if self.lifecycle.state() == SessionState::Closed {
            return;
        }
        let _ = self.lifecycle.begin_drain(reason);
        let released = self.processing.stop();
        let _ = self.registry.release(self);
        self.lifecycle.finish();

        let counters = self.counters.snapshot();
        let reason = self
            .lifecycle
            .close_reason()
            .map_or_else(|| CloseReason::ServerShutdown.to_string(), |r| r.to_string());
        info!(
            client_id = %self.id,
            %reason,
            released,
            received = counters.received,
            processed = counters.processed,
            dropped = counters.dropped,
            "session closed"
        );
    }

    /// Queue a message for the client without waiting.
    pub fn try_send(&self, message: Arc<String>) -> Result<(), TrySendError<Arc<String>>> {
        self.outbound.try_send(message)
    }

    /// Queue a message for the client. Returns `false` if the buffer is
    /// full or the transport is gone.
    pub fn send(&self, message: String) -> bool {
        match self.try_send(Arc::new(message)) {
            Ok(()) => true,
            Err(e) => {
                debug!(client_id = %self.id, error = %e, "failed to enqueue message");
                false
            }
        }
    }

    /// Snapshot for `/sessions`.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            client_id: self.id.clone(),
            state: self.state(),
            created_at: self.created_at,
            queue_depth: self.queue_depth(),
            counters: self.counters(),
        }
    }
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        let _ = self.processing.stop();
        let _ = self.registry.release(self);
    }
}
