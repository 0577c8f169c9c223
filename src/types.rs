//! Core types for the Rapport Flux pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: landmark frames, raw geometric metrics, canonical score vectors and
//! their stabilized form.

use serde::{Deserialize, Serialize};

use crate::error::ComputeError;

/// Number of points in a face mesh frame without iris refinement
pub const FACE_MESH_POINTS: usize = 468;

/// Number of points in a face mesh frame with iris refinement
pub const FACE_MESH_POINTS_WITH_IRIS: usize = 478;

/// Expression label used when no expression could be determined
pub const NO_EXPRESSION_LABEL: &str = "-";

/// A single normalized landmark (x/y in [0,1] image space, z relative depth)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Planar distance to another landmark
    pub fn distance(&self, other: &Landmark) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Midpoint of two landmarks
    pub fn midpoint(&self, other: &Landmark) -> Landmark {
        Landmark {
            x: (self.x + other.x) / 2.0,
            y: (self.y + other.y) / 2.0,
            z: (self.z + other.z) / 2.0,
        }
    }
}

/// One capture instant worth of face mesh landmarks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Landmark>", into = "Vec<Landmark>")]
pub struct LandmarkFrame {
    points: Vec<Landmark>,
}

impl LandmarkFrame {
    /// Build a frame, rejecting point sets too short for a full face mesh
    pub fn new(points: Vec<Landmark>) -> Result<Self, ComputeError> {
        if points.len() < FACE_MESH_POINTS {
            return Err(ComputeError::InvalidLandmarks(format!(
                "expected at least {} points, got {}",
                FACE_MESH_POINTS,
                points.len()
            )));
        }
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(ComputeError::InvalidLandmarks(
                "non-finite landmark coordinate".to_string(),
            ));
        }
        Ok(Self { points })
    }

    /// Landmark at a mesh index. Indices below `FACE_MESH_POINTS` are always present.
    pub fn point(&self, index: usize) -> Landmark {
        self.points.get(index).copied().unwrap_or_default()
    }

    pub fn get(&self, index: usize) -> Option<Landmark> {
        self.points.get(index).copied()
    }

    /// Whether iris (pupil) landmarks are included
    pub fn has_iris(&self) -> bool {
        self.points.len() >= FACE_MESH_POINTS_WITH_IRIS
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }
}

impl TryFrom<Vec<Landmark>> for LandmarkFrame {
    type Error = ComputeError;

    fn try_from(points: Vec<Landmark>) -> Result<Self, Self::Error> {
        LandmarkFrame::new(points)
    }
}

impl From<LandmarkFrame> for Vec<Landmark> {
    fn from(frame: LandmarkFrame) -> Self {
        frame.points
    }
}

/// Eye openness classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlinkState {
    Open,
    Blinking,
    Closed,
}

impl BlinkState {
    /// Per-frame eye score: closed eyes score nothing, a blink in progress scores partially
    pub fn score(&self) -> u8 {
        match self {
            BlinkState::Open => 100,
            BlinkState::Blinking => 60,
            BlinkState::Closed => 0,
        }
    }
}

/// Gaze band relative to the calibrated center
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GazeDirection {
    Center,
    Mid,
    Outer,
}

/// Shoulder posture classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShoulderStatus {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl ShoulderStatus {
    pub fn from_score(score: u8) -> Self {
        match score {
            s if s < 60 => ShoulderStatus::Poor,
            s if s < 80 => ShoulderStatus::Fair,
            s if s < 90 => ShoulderStatus::Good,
            _ => ShoulderStatus::Excellent,
        }
    }
}

/// Eye aspect ratio measurements
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeMetrics {
    pub left_ear: f64,
    pub right_ear: f64,
    /// Mean of both eyes
    pub ear: f64,
    pub state: BlinkState,
}

/// Mouth and eye-corner geometry behind the smile score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpressionMetrics {
    pub mouth_width: f64,
    pub width_score: f64,
    pub raise_score: f64,
    pub eye_smile_bonus: f64,
    /// Smile intensity (0-100)
    pub smile_score: u8,
}

/// Head-over-neck alignment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NeckMetrics {
    /// Angle of the ear-center to nose vector against vertical (degrees)
    pub neck_angle_deg: f64,
    /// Horizontal offset of the ear center from frame center
    pub forward_head: f64,
    pub forward_head_ratio: f64,
    /// Posture score (0-100, floored)
    pub posture_score: u8,
}

/// Gaze deviation from the calibrated center
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeMetrics {
    pub gaze_x: f64,
    pub gaze_y: f64,
    pub distance: f64,
    pub direction: GazeDirection,
    pub is_focused: bool,
    /// Whether pupils were available (otherwise nose tip was used)
    pub used_iris: bool,
    /// Gaze stability score (0-100)
    pub stability_score: u8,
}

/// Shoulder line estimated from the face sides
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShoulderMetrics {
    pub height_diff: f64,
    pub slope: f64,
    pub width: f64,
    pub width_ratio: f64,
    pub rotation_deg: f64,
    pub height_score: f64,
    pub slope_score: f64,
    pub width_score: f64,
    pub rotation_score: f64,
    /// Overall shoulder score (0-100, floored)
    pub score: u8,
    pub status: ShoulderStatus,
}

/// Everything the geometry analyzer measures for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawMetricSet {
    pub eyes: EyeMetrics,
    pub expression: ExpressionMetrics,
    pub neck: NeckMetrics,
    pub gaze: GazeMetrics,
    pub shoulder: ShoulderMetrics,
    /// Eye score derived from the blink state
    pub blink_score: u8,
    /// Attention estimate derived from gaze stability and direction
    pub concentration_score: u8,
}

/// The four canonical dimensions, always present, plus expression and face state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalScoreVector {
    pub attention: u8,
    pub stability: u8,
    pub blink: u8,
    pub posture: u8,
    pub expression_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression_score: Option<u8>,
    pub face_detected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl CanonicalScoreVector {
    /// Vector emitted when no face is visible
    pub fn no_face(status: Option<String>) -> Self {
        Self {
            attention: 0,
            stability: 0,
            blink: 0,
            posture: 0,
            expression_label: NO_EXPRESSION_LABEL.to_string(),
            expression_score: None,
            face_detected: false,
            status,
        }
    }

    pub fn all_zero(&self) -> bool {
        self.attention == 0 && self.stability == 0 && self.blink == 0 && self.posture == 0
    }
}

/// Stabilizer output: either the live vector or a held copy of the last valid one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilizedScoreVector {
    pub scores: CanonicalScoreVector,
    pub using_held_scores: bool,
    /// Set on the single frame that opened a degraded-signal episode
    pub warning_raised: bool,
    /// Whether a degraded-signal episode is currently active
    pub degraded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_points(n: usize) -> Vec<Landmark> {
        vec![Landmark::new(0.5, 0.5); n]
    }

    #[test]
    fn test_frame_rejects_short_point_sets() {
        let err = LandmarkFrame::new(flat_points(100)).unwrap_err();
        assert!(matches!(err, ComputeError::InvalidLandmarks(_)));
    }

    #[test]
    fn test_frame_iris_detection() {
        let mesh = LandmarkFrame::new(flat_points(FACE_MESH_POINTS)).unwrap();
        assert!(!mesh.has_iris());
        let iris = LandmarkFrame::new(flat_points(FACE_MESH_POINTS_WITH_IRIS)).unwrap();
        assert!(iris.has_iris());
    }

    #[test]
    fn test_frame_deserializes_from_point_array() {
        let json = serde_json::to_string(&flat_points(FACE_MESH_POINTS)).unwrap();
        let frame: LandmarkFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(frame.len(), FACE_MESH_POINTS);

        let short = serde_json::to_string(&flat_points(3)).unwrap();
        assert!(serde_json::from_str::<LandmarkFrame>(&short).is_err());
    }

    #[test]
    fn test_shoulder_status_bands() {
        assert_eq!(ShoulderStatus::from_score(50), ShoulderStatus::Poor);
        assert_eq!(ShoulderStatus::from_score(60), ShoulderStatus::Fair);
        assert_eq!(ShoulderStatus::from_score(85), ShoulderStatus::Good);
        assert_eq!(ShoulderStatus::from_score(90), ShoulderStatus::Excellent);
    }

    #[test]
    fn test_no_face_vector_is_zeroed() {
        let v = CanonicalScoreVector::no_face(Some("no-face".to_string()));
        assert!(v.all_zero());
        assert!(!v.face_detected);
        assert_eq!(v.expression_label, NO_EXPRESSION_LABEL);
    }
}
