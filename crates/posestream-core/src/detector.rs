//! Landmark detector contract.
//!
//! The model is an external collaborator. The server only relies on this
//! boundary:
//!
//! - [`LandmarkDetector::detect`] is synchronous and may block
//! - an instance is never called concurrently (`&mut self`)
//! - every processing loop owns its own instance, created by a
//!   [`DetectorFactory`]

use thiserror::Error;

use crate::FrameImage;
use crate::landmarks::LandmarkSet;

/// Why a detector produced no landmarks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DetectError {
    /// The model ran but found nothing in this frame. Not an error for the
    /// session; the frame yields a null result.
    #[error("no landmarks detected")]
    NoDetection,
    /// The instance is unusable. The owning session must close.
    #[error("detector unusable: {0}")]
    Fatal(String),
}

/// A stateful landmark model instance.
pub trait LandmarkDetector: Send {
    /// Run detection on one decoded frame.
    fn detect(&mut self, image: &FrameImage) -> Result<LandmarkSet, DetectError>;
}

/// Creates one detector instance per session.
pub trait DetectorFactory: Send + Sync {
    /// Backend name, for logs and `/health`.
    fn name(&self) -> &str;

    /// Build a fresh instance.
    fn create(&self) -> Result<Box<dyn LandmarkDetector>, DetectError>;
}

/// Detector that never finds anything.
///
/// Used when no model backend is configured; the pipeline still runs and
/// every frame yields a null result with real latency figures.
#[derive(Debug, Default)]
pub struct NullDetector;

impl LandmarkDetector for NullDetector {
    fn detect(&mut self, _image: &FrameImage) -> Result<LandmarkSet, DetectError> {
        Err(DetectError::NoDetection)
    }
}

/// Factory for [`NullDetector`].
#[derive(Debug, Default)]
pub struct NullDetectorFactory;

impl DetectorFactory for NullDetectorFactory {
    fn name(&self) -> &str {
        "null"
    }

    fn create(&self) -> Result<Box<dyn LandmarkDetector>, DetectError> {
        Ok(Box::new(NullDetector))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn null_detector_reports_no_detection() {
        let mut det = NullDetector;
        let img = FrameImage::new(4, 4);
        assert_matches!(det.detect(&img), Err(DetectError::NoDetection));
    }

    #[test]
    fn null_factory_creates_instances() {
        let factory = NullDetectorFactory;
        assert_eq!(factory.name(), "null");
        let mut det = factory.create().unwrap();
        assert_matches!(det.detect(&FrameImage::new(1, 1)), Err(DetectError::NoDetection));
    }

    #[test]
    fn fatal_display_includes_reason() {
        let err = DetectError::Fatal("model crashed".into());
        assert_eq!(err.to_string(), "detector unusable: model crashed");
    }
}
