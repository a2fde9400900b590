//! Landmark model produced by detectors.
//!
//! Coordinates are normalised to the frame: `x` and `y` in `0.0..=1.0`,
//! `z` relative depth with the same scale as `x`.

use serde::{Deserialize, Serialize};

/// A single keypoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    /// Normalised horizontal position.
    pub x: f32,
    /// Normalised vertical position.
    pub y: f32,
    /// Relative depth.
    pub z: f32,
    /// Confidence that the point is visible, when the model reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f32>,
}

impl Landmark {
    /// Create a landmark without a visibility score.
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility: None,
        }
    }

    /// Attach a visibility score.
    #[must_use]
    pub fn with_visibility(mut self, visibility: f32) -> Self {
        self.visibility = Some(visibility);
        self
    }
}

/// Landmarks detected in one frame. Any group may be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSet {
    /// Body pose keypoints.
    #[serde(default)]
    pub pose: Vec<Landmark>,
    /// Left hand keypoints.
    #[serde(default)]
    pub left_hand: Vec<Landmark>,
    /// Right hand keypoints.
    #[serde(default)]
    pub right_hand: Vec<Landmark>,
    /// Face mesh keypoints.
    #[serde(default)]
    pub face: Vec<Landmark>,
}

impl LandmarkSet {
    /// `true` when no group holds any keypoint.
    pub fn is_empty(&self) -> bool {
        self.pose.is_empty()
            && self.left_hand.is_empty()
            && self.right_hand.is_empty()
            && self.face.is_empty()
    }

    /// Total keypoints across all groups.
    pub fn len(&self) -> usize {
        self.pose.len() + self.left_hand.len() + self.right_hand.len() + self.face.len()
    }
}
