//! # posestream-core
//!
//! Foundation types shared by every posestream crate:
//!
//! - **IDs**: [`ClientId`], one per transport connection
//! - **Landmarks**: [`Landmark`] and [`LandmarkSet`] (pose, hands, face)
//! - **Detector contract**: [`LandmarkDetector`] and [`DetectorFactory`]
//! - **Errors**: wire-level [`ErrorKind`] taxonomy
//! - **Logging**: `tracing` subscriber initialisation

#![deny(unsafe_code)]

pub mod detector;
pub mod errors;
pub mod ids;
pub mod landmarks;
pub mod logging;

pub use detector::{DetectError, DetectorFactory, LandmarkDetector, NullDetector, NullDetectorFactory};
pub use errors::ErrorKind;
pub use ids::ClientId;
pub use landmarks::{Landmark, LandmarkSet};

/// Decoded frame handed to detectors: 8-bit RGB, row-major.
pub type FrameImage = image::RgbImage;
