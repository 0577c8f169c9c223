//! Landmark geometry analysis
//!
//! Pure functions turning one face mesh frame plus the active calibration into a
//! raw metric set:
//! 1. eyes - eye aspect ratio and blink state
//! 2. expression - smile intensity
//! 3. posture - neck alignment and estimated shoulder line
//! 4. gaze - deviation from the calibrated center
//!
//! Nothing here keeps state; the blink tracker in `eyes` is the only stateful
//! helper and is owned by the caller.

pub mod eyes;
pub mod expression;
pub mod gaze;
pub mod posture;

use serde::{Deserialize, Serialize};

use crate::calibration::Calibration;
use crate::types::{GazeDirection, GazeMetrics, LandmarkFrame, RawMetricSet};

pub use eyes::BlinkTracker;
pub use gaze::GazeBandScores;

/// Face mesh indices used by the analyzer
pub mod indices {
    pub const NOSE_TIP: usize = 1;
    pub const LEFT_EYE: [usize; 6] = [33, 7, 163, 144, 145, 153];
    pub const RIGHT_EYE: [usize; 6] = [362, 382, 381, 380, 374, 373];
    pub const LEFT_EYE_OUTER: usize = 33;
    pub const LEFT_EYE_INNER: usize = 133;
    pub const RIGHT_EYE_INNER: usize = 362;
    pub const RIGHT_EYE_OUTER: usize = 263;
    pub const MOUTH_LEFT: usize = 61;
    pub const MOUTH_RIGHT: usize = 291;
    pub const FACE_LEFT: usize = 234;
    pub const FACE_RIGHT: usize = 454;
    pub const LEFT_PUPIL: usize = 468;
    pub const RIGHT_PUPIL: usize = 473;
}

/// Scoring constants for the geometry analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    // Smile
    pub smile_width_offset: f64,
    pub smile_width_span: f64,
    pub smile_raise_origin: f64,
    pub smile_raise_span: f64,
    pub smile_width_weight: f64,
    pub smile_raise_weight: f64,
    pub eye_smile_base_width: f64,
    pub eye_smile_max_bonus: f64,

    // Neck
    pub neck_angle_penalty: f64,
    pub forward_head_penalty: f64,
    pub posture_floor: u8,

    // Shoulders
    pub shoulder_offset_y: f64,
    pub shoulder_height_penalty: f64,
    pub shoulder_slope_penalty: f64,
    pub shoulder_width_ratio_min: f64,
    pub shoulder_width_ratio_span: f64,
    pub shoulder_rotation_penalty: f64,
    pub shoulder_floor: u8,

    // Gaze
    pub gaze_scores: GazeBandScores,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            smile_width_offset: 0.12,
            smile_width_span: 0.08,
            smile_raise_origin: 0.5,
            smile_raise_span: 0.1,
            smile_width_weight: 0.7,
            smile_raise_weight: 0.3,
            eye_smile_base_width: 0.08,
            eye_smile_max_bonus: 40.0,
            neck_angle_penalty: 2.0,
            forward_head_penalty: 1000.0,
            posture_floor: 60,
            shoulder_offset_y: 0.1,
            shoulder_height_penalty: 500.0,
            shoulder_slope_penalty: 200.0,
            shoulder_width_ratio_min: 0.8,
            shoulder_width_ratio_span: 0.3,
            shoulder_rotation_penalty: 1.0,
            shoulder_floor: 50,
            gaze_scores: GazeBandScores::default(),
        }
    }
}

/// Clamp to the 0-100 score range
pub(crate) fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}

/// Round a 0-100 value into an integer score
pub(crate) fn to_score(value: f64) -> u8 {
    clamp_score(value).round() as u8
}

/// Entry point for geometry analysis
pub struct LandmarkAnalyzer;

impl LandmarkAnalyzer {
    /// Measure every raw metric for one frame
    pub fn analyze(
        frame: &LandmarkFrame,
        calibration: &Calibration,
        config: &GeometryConfig,
    ) -> RawMetricSet {
        let eyes = eyes::measure(frame, calibration);
        let expression = expression::measure(frame, config);
        let neck = posture::measure_neck(frame, calibration, config);
        let shoulder = posture::measure_shoulders(frame, calibration, config);
        let gaze = gaze::measure(frame, calibration, &config.gaze_scores);

        RawMetricSet {
            eyes,
            expression,
            neck,
            gaze,
            shoulder,
            blink_score: eyes.state.score(),
            concentration_score: Self::concentration(&gaze),
        }
    }

    /// Attention estimate: gaze stability nudged by focus and direction
    pub fn concentration(gaze: &GazeMetrics) -> u8 {
        let mut score = gaze.stability_score as f64;
        if gaze.is_focused {
            score += 10.0;
        }
        match gaze.direction {
            GazeDirection::Center => score += 5.0,
            GazeDirection::Outer => score -= 10.0,
            GazeDirection::Mid => {}
        }
        to_score(score)
    }
}
