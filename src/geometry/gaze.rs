//! Gaze deviation from the calibrated center

use serde::{Deserialize, Serialize};

use super::indices::{LEFT_PUPIL, NOSE_TIP, RIGHT_PUPIL};
use crate::calibration::Calibration;
use crate::types::{GazeDirection, GazeMetrics, Landmark, LandmarkFrame};

/// Score awarded per gaze band, innermost first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GazeBandScores {
    pub center: u8,
    pub inner: u8,
    pub mid: u8,
    pub outer: u8,
}

impl Default for GazeBandScores {
    fn default() -> Self {
        Self::generous()
    }
}

impl GazeBandScores {
    pub fn generous() -> Self {
        Self {
            center: 100,
            inner: 90,
            mid: 70,
            outer: 30,
        }
    }

    pub fn strict() -> Self {
        Self {
            center: 100,
            inner: 80,
            mid: 50,
            outer: 0,
        }
    }
}

/// Gaze point: mean of both pupils when available, nose tip otherwise
pub fn gaze_point(frame: &LandmarkFrame) -> (Landmark, bool) {
    match (frame.get(LEFT_PUPIL), frame.get(RIGHT_PUPIL)) {
        (Some(left), Some(right)) => (left.midpoint(&right), true),
        _ => (frame.point(NOSE_TIP), false),
    }
}

pub fn measure(
    frame: &LandmarkFrame,
    calibration: &Calibration,
    scores: &GazeBandScores,
) -> GazeMetrics {
    let (point, used_iris) = gaze_point(frame);
    let center = Landmark::new(calibration.center_h, calibration.center_v);
    let distance = point.distance(&center);

    let center_band = calibration.band_center_half;
    let mid_band = calibration.band_mid_half;

    let stability_score = if distance > mid_band {
        scores.outer
    } else if distance > center_band {
        scores.mid
    } else if distance > center_band * 0.5 {
        scores.inner
    } else {
        scores.center
    };

    let direction = if distance > mid_band {
        GazeDirection::Outer
    } else if distance > center_band {
        GazeDirection::Mid
    } else {
        GazeDirection::Center
    };

    GazeMetrics {
        gaze_x: point.x,
        gaze_y: point.y,
        distance,
        direction,
        is_focused: distance <= center_band,
        used_iris,
        stability_score,
    }
}
