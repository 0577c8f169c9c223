//! Smile intensity from mouth-corner geometry

use super::indices::{
    LEFT_EYE_INNER, LEFT_EYE_OUTER, MOUTH_LEFT, MOUTH_RIGHT, RIGHT_EYE_INNER, RIGHT_EYE_OUTER,
};
use super::{clamp_score, to_score, GeometryConfig};
use crate::types::{ExpressionMetrics, LandmarkFrame};

/// Smile intensity: weighted mouth width and corner raise, plus an eye-corner bonus
pub fn measure(frame: &LandmarkFrame, config: &GeometryConfig) -> ExpressionMetrics {
    let left = frame.point(MOUTH_LEFT);
    let right = frame.point(MOUTH_RIGHT);

    let mouth_width = (right.x - left.x).abs();
    let width_score =
        clamp_score((mouth_width - config.smile_width_offset) / config.smile_width_span * 100.0);

    // y grows downward, so raised corners sit above the raise origin
    let raise = config.smile_raise_origin - left.y.min(right.y);
    let raise_score = clamp_score(raise / config.smile_raise_span * 100.0);

    let eye_smile_bonus = eye_smile_bonus(frame, config);
    let smile = config.smile_width_weight * width_score + config.smile_raise_weight * raise_score;

    ExpressionMetrics {
        mouth_width,
        width_score,
        raise_score,
        eye_smile_bonus,
        smile_score: to_score(smile + eye_smile_bonus),
    }
}

fn eye_smile_bonus(frame: &LandmarkFrame, config: &GeometryConfig) -> f64 {
    if config.eye_smile_base_width <= 0.0 {
        return 0.0;
    }
    let left = frame.point(LEFT_EYE_OUTER).distance(&frame.point(LEFT_EYE_INNER));
    let right = frame.point(RIGHT_EYE_INNER).distance(&frame.point(RIGHT_EYE_OUTER));
    let ratio = ((left + right) / (2.0 * config.eye_smile_base_width)).min(1.0);
    (ratio * config.eye_smile_max_bonus).round()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::test_support::frontal_frame;
    use crate::types::Landmark;

    fn with_mouth(left: (f64, f64), right: (f64, f64)) -> LandmarkFrame {
        let base = frontal_frame(0.3, (0.5, 0.53));
        let mut points = base.points().to_vec();
        points[MOUTH_LEFT] = Landmark::new(left.0, left.1);
        points[MOUTH_RIGHT] = Landmark::new(right.0, right.1);
        LandmarkFrame::new(points).unwrap()
    }

    #[test]
    fn test_neutral_mouth_only_scores_eye_bonus() {
        let metrics = measure(&with_mouth((0.45, 0.65), (0.55, 0.65)), &GeometryConfig::default());
        assert_eq!(metrics.width_score, 0.0);
        assert_eq!(metrics.raise_score, 0.0);
        assert_eq!(metrics.eye_smile_bonus, 40.0);
        assert_eq!(metrics.smile_score, 40);
    }

    #[test]
    fn test_wide_raised_smile_caps_at_100() {
        let metrics = measure(&with_mouth((0.38, 0.35), (0.62, 0.35)), &GeometryConfig::default());
        assert_eq!(metrics.width_score, 100.0);
        assert_eq!(metrics.raise_score, 100.0);
        assert_eq!(metrics.smile_score, 100);
    }

    #[test]
    fn test_partial_smile() {
        // width 0.16 -> 50, raise 0.05 -> 50, weighted 50, bonus 40
        let metrics = measure(&with_mouth((0.42, 0.45), (0.58, 0.47)), &GeometryConfig::default());
        assert!((metrics.width_score - 50.0).abs() < 1e-6);
        assert!((metrics.raise_score - 50.0).abs() < 1e-6);
        assert_eq!(metrics.smile_score, 90);
    }
}
