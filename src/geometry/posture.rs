//! Neck alignment and shoulder line scoring

use super::indices::{FACE_LEFT, FACE_RIGHT, NOSE_TIP};
use super::{to_score, GeometryConfig};
use crate::calibration::Calibration;
use crate::types::{LandmarkFrame, NeckMetrics, ShoulderMetrics, ShoulderStatus};

/// Head-over-neck alignment from the nose tip and the ear center
pub fn measure_neck(
    frame: &LandmarkFrame,
    calibration: &Calibration,
    config: &GeometryConfig,
) -> NeckMetrics {
    let nose = frame.point(NOSE_TIP);
    let ear_center = frame.point(FACE_LEFT).midpoint(&frame.point(FACE_RIGHT));

    let dx = nose.x - ear_center.x;
    let dy = nose.y - ear_center.y;
    // 0 degrees when the nose hangs straight below the ear line
    let neck_angle_deg = dx.atan2(dy).abs().to_degrees();

    let forward_head = (ear_center.x - 0.5).abs();
    let neck_length = dx.hypot(dy);
    let forward_head_ratio = if neck_length > f64::EPSILON {
        forward_head / neck_length
    } else {
        0.0
    };

    let angle_score = (100.0
        - (neck_angle_deg - calibration.neck_angle_baseline).abs() * config.neck_angle_penalty)
        .max(0.0);
    let forward_score = (100.0
        - (forward_head - calibration.chin_forward_baseline).abs() * config.forward_head_penalty)
        .max(0.0);

    let posture_score = to_score((angle_score + forward_score) / 2.0).max(config.posture_floor);

    NeckMetrics {
        neck_angle_deg,
        forward_head,
        forward_head_ratio,
        posture_score,
    }
}

/// Shoulder line estimated by dropping the face sides a fixed distance
pub fn measure_shoulders(
    frame: &LandmarkFrame,
    calibration: &Calibration,
    config: &GeometryConfig,
) -> ShoulderMetrics {
    let mut left = frame.point(FACE_LEFT);
    let mut right = frame.point(FACE_RIGHT);
    left.y += config.shoulder_offset_y;
    right.y += config.shoulder_offset_y;

    let dy = right.y - left.y;
    let width = (right.x - left.x).abs();
    let height_diff = dy.abs();
    let slope = if width > f64::EPSILON { dy / width } else { 0.0 };
    let width_ratio = if calibration.shoulder_width_baseline > 0.0 {
        width / calibration.shoulder_width_baseline
    } else {
        0.0
    };
    let rotation_deg = slope.atan().to_degrees();

    let height_score = (100.0 - height_diff * config.shoulder_height_penalty).max(0.0);
    let slope_score = (100.0 - slope.abs() * config.shoulder_slope_penalty).max(0.0);
    let width_score = ((width_ratio - config.shoulder_width_ratio_min)
        / config.shoulder_width_ratio_span
        * 100.0)
        .clamp(0.0, 100.0);
    let rotation_score = (100.0 - rotation_deg.abs() * config.shoulder_rotation_penalty).max(0.0);

    let average = (height_score + slope_score + width_score + rotation_score) / 4.0;
    let score = to_score(average).max(config.shoulder_floor);

    ShoulderMetrics {
        height_diff,
        slope,
        width,
        width_ratio,
        rotation_deg,
        height_score,
        slope_score,
        width_score,
        rotation_score,
        score,
        status: ShoulderStatus::from_score(score),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::test_support::frontal_frame;
    use crate::types::Landmark;

    fn reposition(points: &[(usize, f64, f64)]) -> LandmarkFrame {
        let mut all = frontal_frame(0.3, (0.5, 0.53)).points().to_vec();
        for &(i, x, y) in points {
            all[i] = Landmark::new(x, y);
        }
        LandmarkFrame::new(all).unwrap()
    }

    #[test]
    fn test_upright_neck() {
        let metrics = measure_neck(
            &frontal_frame(0.3, (0.5, 0.53)),
            &Calibration::default(),
            &GeometryConfig::default(),
        );
        assert!(metrics.neck_angle_deg.abs() < 1e-9);
        assert!(metrics.forward_head.abs() < 1e-9);
        // angle 100 - 12*2 = 76, forward 100 - 0.02*1000 = 80
        assert_eq!(metrics.posture_score, 78);
    }

    #[test]
    fn test_neck_floor() {
        let frame = reposition(&[
            (FACE_LEFT, 0.56, 0.5),
            (FACE_RIGHT, 0.84, 0.5),
            (NOSE_TIP, 0.75, 0.55),
        ]);
        let metrics = measure_neck(&frame, &Calibration::default(), &GeometryConfig::default());
        assert!((metrics.neck_angle_deg - 45.0).abs() < 1e-6);
        assert!((metrics.forward_head - 0.2).abs() < 1e-9);
        assert!(metrics.forward_head_ratio > 2.0);
        assert_eq!(metrics.posture_score, 60);
    }

    #[test]
    fn test_level_shoulders() {
        let metrics = measure_shoulders(
            &frontal_frame(0.3, (0.5, 0.53)),
            &Calibration::default(),
            &GeometryConfig::default(),
        );
        assert!(metrics.height_diff.abs() < 1e-9);
        assert!((metrics.width_ratio - 1.0).abs() < 1e-9);
        // (100 + 100 + 66.7 + 100) / 4
        assert_eq!(metrics.score, 92);
        assert_eq!(metrics.status, ShoulderStatus::Excellent);
    }

    #[test]
    fn test_tilted_shoulders_hit_floor() {
        let frame = reposition(&[(FACE_LEFT, 0.36, 0.35), (FACE_RIGHT, 0.64, 0.65)]);
        let metrics = measure_shoulders(&frame, &Calibration::default(), &GeometryConfig::default());
        assert_eq!(metrics.height_score, 0.0);
        assert_eq!(metrics.slope_score, 0.0);
        assert!(metrics.rotation_deg > 30.0);
        assert_eq!(metrics.score, 50);
        assert_eq!(metrics.status, ShoulderStatus::Poor);
    }
}
