//! Frame jobs and processing results.

use std::time::Instant;

use posestream_core::LandmarkSet;

use crate::session::counters::CounterSnapshot;

/// One submitted frame. Immutable once queued.
#[derive(Debug)]
pub struct FrameJob {
    /// Per-session sequence number.
    pub sequence: u64,
    /// Encoded image payload as received.
    pub payload: String,
    /// When the server accepted the frame.
    pub received_at: Instant,
    /// Client-supplied capture timestamp (ms), echoed in the result.
    pub client_timestamp: Option<i64>,
}

impl FrameJob {
    /// Create a job stamped with the current instant.
    pub fn new(sequence: u64, payload: String, client_timestamp: Option<i64>) -> Self {
        Self {
            sequence,
            payload,
            received_at: Instant::now(),
            client_timestamp,
        }
    }
}

/// What processing a frame produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Landmarks found.
    Detected(LandmarkSet),
    /// Detector ran and found nothing.
    NoDetection,
    /// The payload could not be decoded; carries the decoder message.
    DecodeFailed(String),
}

/// Result for one processed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingResult {
    /// Sequence of the originating frame.
    pub sequence: u64,
    /// Client timestamp of the originating frame.
    pub client_timestamp: Option<i64>,
    /// Detection outcome.
    pub outcome: Outcome,
    /// Dequeue-to-encode latency, microseconds.
    pub latency_us: u64,
    /// Session counters at completion.
    pub counters: CounterSnapshot,
}
