//! Fixtures shared by unit tests: encoded frames, scripted detectors and
//! session builders.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageFormat, Rgb, RgbImage};
use parking_lot::{Condvar, Mutex};
use posestream_core::{
    ClientId, DetectError, DetectorFactory, FrameImage, Landmark, LandmarkDetector, LandmarkSet,
    NullDetectorFactory,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::registry::ConnectionRegistry;
use crate::session::{ClientSession, SessionContext};

fn encoded(width: u32, height: u32, format: ImageFormat) -> String {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x * 40) as u8, (y * 40) as u8, 128]));
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, format).unwrap();
    STANDARD.encode(bytes.into_inner())
}

/// Base64 PNG of the given size.
pub fn png_payload(width: u32, height: u32) -> String {
    encoded(width, height, ImageFormat::Png)
}

/// Base64 JPEG of the given size.
pub fn jpeg_payload(width: u32, height: u32) -> String {
    encoded(width, height, ImageFormat::Jpeg)
}

/// A small non-empty landmark set.
pub fn sample_set() -> LandmarkSet {
    LandmarkSet {
        pose: vec![
            Landmark::new(0.5, 0.25, 0.0).with_visibility(0.9),
            Landmark::new(0.5, 0.5, -0.1),
        ],
        left_hand: vec![Landmark::new(0.2, 0.6, 0.0)],
        right_hand: Vec::new(),
        face: Vec::new(),
    }
}

/// Replays canned outcomes, then reports no detection.
pub struct ScriptedDetector {
    script: VecDeque<Result<LandmarkSet, DetectError>>,
}

impl ScriptedDetector {
    pub fn new(script: Vec<Result<LandmarkSet, DetectError>>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

impl LandmarkDetector for ScriptedDetector {
    fn detect(&mut self, _image: &FrameImage) -> Result<LandmarkSet, DetectError> {
        self.script.pop_front().unwrap_or(Err(DetectError::NoDetection))
    }
}

/// Always unusable.
pub struct FatalDetector;

impl LandmarkDetector for FatalDetector {
    fn detect(&mut self, _image: &FrameImage) -> Result<LandmarkSet, DetectError> {
        Err(DetectError::Fatal("model unloaded".into()))
    }
}

/// Panics on every call.
pub struct PanickingDetector;

impl LandmarkDetector for PanickingDetector {
    fn detect(&mut self, _image: &FrameImage) -> Result<LandmarkSet, DetectError> {
        panic!("inference blew up");
    }
}

/// Holds detectors inside `detect` until opened.
#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
    entered: AtomicUsize,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Release every waiting and future detector call.
    pub fn open(&self) {
        *self.open.lock() = true;
        let _ = self.cond.notify_all();
    }

    /// Detector calls that have reached the gate.
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    /// Wait until `n` detector calls have reached the gate.
    pub async fn wait_entered(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.entered() < n {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();
    }

    fn pass(&self) {
        let _ = self.entered.fetch_add(1, Ordering::SeqCst);
        let mut open = self.open.lock();
        while !*open {
            self.cond.wait(&mut open);
        }
    }
}

struct GatedDetector(Arc<Gate>);

impl LandmarkDetector for GatedDetector {
    fn detect(&mut self, _image: &FrameImage) -> Result<LandmarkSet, DetectError> {
        self.0.pass();
        Err(DetectError::NoDetection)
    }
}

struct FnFactory<F>(F);

impl<F> DetectorFactory for FnFactory<F>
where
    F: Fn() -> Box<dyn LandmarkDetector> + Send + Sync,
{
    fn name(&self) -> &str {
        "test"
    }

    fn create(&self) -> Result<Box<dyn LandmarkDetector>, DetectError> {
        Ok((self.0)())
    }
}

/// Factory building detectors with `make`.
pub fn detector_factory<F>(make: F) -> Arc<dyn DetectorFactory>
where
    F: Fn() -> Box<dyn LandmarkDetector> + Send + Sync + 'static,
{
    Arc::new(FnFactory(make))
}

/// Factory whose detectors block on `gate`, then report no detection.
pub fn gated_factory(gate: &Arc<Gate>) -> Arc<dyn DetectorFactory> {
    let gate = gate.clone();
    detector_factory(move || Box::new(GatedDetector(gate.clone())))
}

/// Factory that cannot build anything.
pub struct FailingFactory;

impl DetectorFactory for FailingFactory {
    fn name(&self) -> &str {
        "failing"
    }

    fn create(&self) -> Result<Box<dyn LandmarkDetector>, DetectError> {
        Err(DetectError::Fatal("weights missing".into()))
    }
}

/// Session context over a fresh registry and the null detector.
pub fn session_ctx(capacity: Option<usize>) -> SessionContext {
    session_ctx_with(capacity, Arc::new(NullDetectorFactory))
}

/// Session context over a fresh registry and `factory`.
pub fn session_ctx_with(capacity: Option<usize>, factory: Arc<dyn DetectorFactory>) -> SessionContext {
    let registry = match capacity {
        Some(n) => ConnectionRegistry::with_capacity(n),
        None => ConnectionRegistry::new(),
    };
    SessionContext {
        registry: Arc::new(registry),
        factory,
        queue_capacity: 2,
        shutdown: CancellationToken::new(),
    }
}

/// A `Connecting` session plus the receiving end of its outbound channel.
pub fn session_with_id(
    ctx: &SessionContext,
    id: &str,
) -> (Arc<ClientSession>, mpsc::Receiver<Arc<String>>) {
    let (tx, rx) = mpsc::channel(4);
    (ClientSession::new(ClientId::from(id), ctx, tx), rx)
}
