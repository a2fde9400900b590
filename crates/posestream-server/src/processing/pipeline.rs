//! Per-session processing loop: dequeue → decode → detect → encode → emit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use parking_lot::Mutex;
use posestream_core::{ClientId, DetectError, DetectorFactory, ErrorKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use super::job::{FrameJob, Outcome, ProcessingResult};
use super::queue::FrameQueue;
use super::worker::{DetectorWorker, Stage};
use crate::codec;
use crate::metrics::{
    DETECTOR_FAILURES_TOTAL, FRAME_PROCESSING_SECONDS, FRAMES_DROPPED_TOTAL,
    FRAMES_PROCESSED_TOTAL, FRAMES_RECEIVED_TOTAL,
};
use crate::protocol::envelope;
use crate::session::counters::SessionCounters;
use crate::session::state::{CloseReason, Lifecycle};

/// How long a detector failure notice may wait for room in the outbound buffer.
const FATAL_NOTICE_TIMEOUT: Duration = Duration::from_secs(1);

/// What the running loop needs from its session.
pub struct LoopContext {
    /// Owning session.
    pub client_id: ClientId,
    /// Transport-bound channel for results.
    pub outbound: mpsc::Sender<Arc<String>>,
    /// Session lifecycle, drained on fatal errors and send failures.
    pub lifecycle: Arc<Lifecycle>,
}

/// Bounded queue plus the task that drains it through a detector.
///
/// Jobs may be submitted before [`ProcessingLoop::start`]; they wait in the
/// queue under the same drop-oldest policy.
pub struct ProcessingLoop {
    queue: Arc<FrameQueue>,
    counters: Arc<SessionCounters>,
    factory: Arc<dyn DetectorFactory>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ProcessingLoop {
    /// Create a stopped loop. `cancel` ends it.
    pub fn new(
        capacity: usize,
        counters: Arc<SessionCounters>,
        factory: Arc<dyn DetectorFactory>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue: Arc::new(FrameQueue::new(capacity)),
            counters,
            factory,
            cancel,
            task: Mutex::new(None),
        }
    }

    /// Enqueue a frame. Returns the job displaced by backpressure, if any,
    /// which is counted as dropped.
    pub fn submit(&self, job: FrameJob) -> Option<FrameJob> {
        self.counters.record_received();
        counter!(FRAMES_RECEIVED_TOTAL).increment(1);
        let displaced = self.queue.push(job);
        if displaced.is_some() {
            self.counters.record_dropped();
            counter!(FRAMES_DROPPED_TOTAL, "reason" => "backpressure").increment(1);
        }
        displaced
    }

    /// Create the detector and spawn the loop task. No-op if already started;
    /// a stopped loop is never restarted.
    pub fn start(&self, ctx: LoopContext) -> Result<(), DetectError> {
        let mut task = self.task.lock();
        if task.is_some() {
            return Ok(());
        }
        let detector = self.factory.create()?;
        let worker = DetectorWorker::spawn(&ctx.client_id, detector)
            .map_err(|e| DetectError::Fatal(format!("failed to spawn detector thread: {e}")))?;
        debug!(client_id = %ctx.client_id, detector = self.factory.name(), "processing loop starting");
        *task = Some(tokio::spawn(run_loop(
            self.queue.clone(),
            self.counters.clone(),
            worker,
            self.cancel.clone(),
            ctx,
        )));
        Ok(())
    }

    /// Stop the loop, abandon in-flight detection and release queued jobs.
    ///
    /// Returns how many queued jobs were released.
    pub fn stop(&self) -> usize {
        self.cancel.cancel();
        if let Some(task) = self.task.lock().as_ref() {
            task.abort();
        }
        self.queue.close();
        self.queue.clear()
    }

    /// Pending jobs.
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    /// Whether the loop task has been spawned and not yet finished.
    pub fn is_running(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }
}

#[instrument(skip_all, fields(client_id = %ctx.client_id))]
async fn run_loop(
    queue: Arc<FrameQueue>,
    counters: Arc<SessionCounters>,
    worker: DetectorWorker,
    cancel: CancellationToken,
    ctx: LoopContext,
) {
    loop {
        let job = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            job = queue.next() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let started = Instant::now();
        let FrameJob {
            sequence,
            payload,
            received_at,
            client_timestamp,
        } = job;

        let stage = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!(sequence, "abandoning in-flight frame");
                break;
            }
            stage = worker.run(payload) => stage,
        };

        let outcome = match stage {
            Stage::Detected(set) => {
                counters.record_processed();
                Outcome::Detected(set)
            }
            Stage::NoDetection => {
                counters.record_processed();
                Outcome::NoDetection
            }
            Stage::DecodeFailed(detail) => {
                warn!(sequence, error = %detail, "frame decode failed");
                counters.record_dropped();
                counter!(FRAMES_DROPPED_TOTAL, "reason" => "decode").increment(1);
                Outcome::DecodeFailed(detail)
            }
            Stage::Fatal(reason) => {
                error!(sequence, %reason, "detector failed, closing session");
                counter!(DETECTOR_FAILURES_TOTAL).increment(1);
                let notice = envelope::error_message(ErrorKind::DetectorFatal, &reason, Some(sequence));
                let delivered = tokio::select! {
                    biased;
                    () = cancel.cancelled() => false,
                    sent = tokio::time::timeout(FATAL_NOTICE_TIMEOUT, ctx.outbound.send(Arc::new(notice))) => {
                        matches!(sent, Ok(Ok(())))
                    }
                };
                if !delivered {
                    debug!("could not deliver detector failure notice");
                }
                let _ = ctx.lifecycle.begin_drain(CloseReason::DetectorFatal(reason));
                break;
            }
        };
        if !matches!(outcome, Outcome::DecodeFailed(_)) {
            counter!(FRAMES_PROCESSED_TOTAL).increment(1);
        }

        // The emitted figure stops at result assembly; the session mean/max
        // also covers encoding.
        let assembled = started.elapsed();
        let result = ProcessingResult {
            sequence,
            client_timestamp,
            outcome,
            latency_us: u64::try_from(assembled.as_micros()).unwrap_or(u64::MAX),
            counters: counters.snapshot(),
        };
        let encoded = Arc::new(codec::encode_result(&result));
        let latency = started.elapsed();
        counters.record_latency(latency);
        histogram!(FRAME_PROCESSING_SECONDS).record(latency.as_secs_f64());
        debug!(
            sequence,
            queue_depth = queue.len(),
            queued_ms = started.duration_since(received_at).as_secs_f64() * 1000.0,
            latency_ms = latency.as_secs_f64() * 1000.0,
            "frame processed"
        );

        let sent = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            sent = ctx.outbound.send(encoded) => sent,
        };
        if sent.is_err() {
            warn!(sequence, "outbound channel closed, draining session");
            let _ = ctx.lifecycle.begin_drain(CloseReason::SendFailed);
            break;
        }
    }
    debug!("processing loop stopped");
}
