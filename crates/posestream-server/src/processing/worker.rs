//! Dedicated detector thread.
//!
//! Detection is synchronous and may block for an unbounded time, so each
//! session runs its detector on its own OS thread rather than on the async
//! runtime. The processing loop hands over one payload at a time and awaits
//! the reply. Dropping the [`DetectorWorker`] detaches the thread: a
//! detection already in progress finishes in the background and its result
//! is discarded.

use std::panic::{AssertUnwindSafe, catch_unwind};

use posestream_core::{ClientId, DetectError, LandmarkDetector, LandmarkSet};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::codec;

/// What the worker made of one payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    /// Landmarks found.
    Detected(LandmarkSet),
    /// Detector ran and found nothing.
    NoDetection,
    /// The payload was not a decodable image.
    DecodeFailed(String),
    /// The detector is unusable; no further work will be accepted.
    Fatal(String),
}

struct WorkItem {
    payload: String,
    reply: oneshot::Sender<Stage>,
}

/// Handle to a session's detector thread.
pub struct DetectorWorker {
    tx: mpsc::Sender<WorkItem>,
}

impl DetectorWorker {
    /// Spawn the thread that owns `detector`.
    pub fn spawn(client_id: &ClientId, detector: Box<dyn LandmarkDetector>) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel(1);
        let _handle = std::thread::Builder::new()
            .name(format!("detector-{client_id}"))
            .spawn(move || worker_main(detector, rx))?;
        Ok(Self { tx })
    }

    /// Decode and detect one payload on the worker thread.
    pub async fn run(&self, payload: String) -> Stage {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(WorkItem { payload, reply }).await.is_err() {
            return Stage::Fatal("detector worker stopped".into());
        }
        rx.await
            .unwrap_or_else(|_| Stage::Fatal("detector worker stopped".into()))
    }
}

fn worker_main(mut detector: Box<dyn LandmarkDetector>, mut rx: mpsc::Receiver<WorkItem>) {
    while let Some(item) = rx.blocking_recv() {
        let stage = process(detector.as_mut(), &item.payload);
        let fatal = matches!(stage, Stage::Fatal(_));
        if item.reply.send(stage).is_err() {
            debug!("detection result abandoned");
        }
        if fatal {
            break;
        }
    }
}

fn process(detector: &mut dyn LandmarkDetector, payload: &str) -> Stage {
    let image = match codec::decode_frame(payload) {
        Ok(image) => image,
        Err(e) => return Stage::DecodeFailed(e.to_string()),
    };
    match catch_unwind(AssertUnwindSafe(|| detector.detect(&image))) {
        Ok(Ok(set)) if set.is_empty() => Stage::NoDetection,
        Ok(Ok(set)) => Stage::Detected(set),
        Ok(Err(DetectError::NoDetection)) => Stage::NoDetection,
        Ok(Err(DetectError::Fatal(reason))) => Stage::Fatal(reason),
        Err(_) => {
            error!("detector panicked");
            Stage::Fatal("detector panicked".into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FatalDetector, PanickingDetector, ScriptedDetector, png_payload, sample_set};
    use assert_matches::assert_matches;
    use posestream_core::NullDetector;

    fn spawn(detector: Box<dyn LandmarkDetector>) -> DetectorWorker {
        DetectorWorker::spawn(&ClientId::from("client_test"), detector).unwrap()
    }

    #[tokio::test]
    async fn null_detector_yields_no_detection() {
        let worker = spawn(Box::new(NullDetector));
        assert_eq!(worker.run(png_payload(4, 4)).await, Stage::NoDetection);
    }

    #[tokio::test]
    async fn landmarks_are_returned() {
        let worker = spawn(Box::new(ScriptedDetector::new(vec![Ok(sample_set())])));
        assert_eq!(worker.run(png_payload(4, 4)).await, Stage::Detected(sample_set()));
    }

    #[tokio::test]
    async fn empty_set_is_no_detection() {
        let worker = spawn(Box::new(ScriptedDetector::new(vec![Ok(LandmarkSet::default())])));
        assert_eq!(worker.run(png_payload(4, 4)).await, Stage::NoDetection);
    }

    #[tokio::test]
    async fn undecodable_payload_skips_detector() {
        let worker = spawn(Box::new(ScriptedDetector::new(vec![Ok(sample_set())])));
        assert_matches!(worker.run("garbage".into()).await, Stage::DecodeFailed(_));
        // the scripted landmarks are still unused
        assert_eq!(worker.run(png_payload(2, 2)).await, Stage::Detected(sample_set()));
    }

    #[tokio::test]
    async fn fatal_stops_worker() {
        let worker = spawn(Box::new(FatalDetector));
        assert_matches!(worker.run(png_payload(2, 2)).await, Stage::Fatal(r) if r == "model unloaded");
        assert_matches!(
            worker.run(png_payload(2, 2)).await,
            Stage::Fatal(r) if r == "detector worker stopped"
        );
    }

    #[tokio::test]
    async fn panic_is_fatal() {
        let worker = spawn(Box::new(PanickingDetector));
        assert_matches!(worker.run(png_payload(2, 2)).await, Stage::Fatal(r) if r == "detector panicked");
    }
}
