//! Score stabilization under intermittent signal loss
//!
//! Short dropouts (a blink of the detector, a hand in front of the camera) should
//! not make the displayed scores collapse to zero. The stabilizer keeps the last
//! valid vector and replays it for a bounded hold window, and raises a single
//! degraded-signal warning once invalid frames keep arriving.

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::canonical::normalize_status;
use crate::error::ComputeError;
use crate::types::{CanonicalScoreVector, StabilizedScoreVector};

/// Statuses that mark a frame as carrying no usable scores
pub const ZERO_EQUIVALENT_STATUSES: &[&str] = &["no-data", "no-face", "analysis-error", "error"];

/// Tunables for the stabilizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilizerConfig {
    /// How long after the last valid frame it may be replayed (ms)
    pub hold_duration_ms: i64,
    /// Consecutive invalid frames before the degraded-signal warning
    pub zero_warning_threshold: u32,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            hold_duration_ms: 3_000,
            zero_warning_threshold: 4,
        }
    }
}

impl StabilizerConfig {
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.hold_duration_ms < 0 {
            return Err(ComputeError::InvalidConfig(
                "stabilizer: hold duration must not be negative".to_string(),
            ));
        }
        if self.zero_warning_threshold == 0 {
            return Err(ComputeError::InvalidConfig(
                "stabilizer: warning threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Whether a canonical vector carries no usable scores
pub fn is_zero_equivalent(vector: &CanonicalScoreVector) -> bool {
    let status_says_empty = vector
        .status
        .as_deref()
        .map(normalize_status)
        .is_some_and(|s| ZERO_EQUIVALENT_STATUSES.contains(&s.as_str()));
    vector.all_zero() || status_says_empty
}

/// Holds last-valid scores across short signal dropouts
#[derive(Debug, Clone, Default)]
pub struct ScoreStabilizer {
    config: StabilizerConfig,
    last_valid: Option<(CanonicalScoreVector, DateTime<Utc>)>,
    zero_run: u32,
    warning_active: bool,
}

impl ScoreStabilizer {
    pub fn new(config: StabilizerConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Stabilize one canonical vector observed at `now`
    pub fn process(&mut self, vector: CanonicalScoreVector, now: DateTime<Utc>) -> StabilizedScoreVector {
        if !is_zero_equivalent(&vector) {
            if self.warning_active {
                info!("signal recovered after {} invalid frames", self.zero_run);
            }
            self.zero_run = 0;
            self.warning_active = false;
            self.last_valid = Some((vector.clone(), now));
            return StabilizedScoreVector {
                scores: vector,
                using_held_scores: false,
                warning_raised: false,
                degraded: false,
            };
        }

        self.zero_run = self.zero_run.saturating_add(1);
        let warning_raised =
            !self.warning_active && self.zero_run >= self.config.zero_warning_threshold;
        if warning_raised {
            self.warning_active = true;
            warn!(
                "degraded signal: {} consecutive frames without usable scores",
                self.zero_run
            );
        }

        let hold = Duration::milliseconds(self.config.hold_duration_ms);
        let held = self
            .last_valid
            .as_ref()
            .filter(|(_, at)| now - *at <= hold)
            .map(|(scores, _)| scores.clone());

        StabilizedScoreVector {
            using_held_scores: held.is_some(),
            scores: held.unwrap_or(vector),
            warning_raised,
            degraded: self.warning_active,
        }
    }

    /// Consecutive invalid frames so far
    pub fn zero_run(&self) -> u32 {
        self.zero_run
    }

    pub fn is_degraded(&self) -> bool {
        self.warning_active
    }

    pub fn last_valid(&self) -> Option<&CanonicalScoreVector> {
        self.last_valid.as_ref().map(|(v, _)| v)
    }

    pub fn reset(&mut self) {
        self.last_valid = None;
        self.zero_run = 0;
        self.warning_active = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    fn valid() -> CanonicalScoreVector {
        CanonicalScoreVector {
            attention: 70,
            stability: 80,
            blink: 90,
            posture: 75,
            expression_label: "positive".to_string(),
            expression_score: Some(70),
            face_detected: true,
            status: None,
        }
    }

    fn zero() -> CanonicalScoreVector {
        CanonicalScoreVector::no_face(Some("no-face".to_string()))
    }

    #[test]
    fn test_hold_window() {
        let mut stabilizer = ScoreStabilizer::default();
        stabilizer.process(valid(), t(0));

        let at_500 = stabilizer.process(zero(), t(500));
        assert!(at_500.using_held_scores);
        assert_eq!(at_500.scores, valid());

        let at_2500 = stabilizer.process(zero(), t(2_500));
        assert!(at_2500.using_held_scores);
        assert_eq!(at_2500.scores, valid());

        let at_3500 = stabilizer.process(zero(), t(3_500));
        assert!(!at_3500.using_held_scores);
        assert_eq!(at_3500.scores, zero());
    }

    #[test]
    fn test_pass_through_without_history() {
        let mut stabilizer = ScoreStabilizer::default();
        let out = stabilizer.process(zero(), t(0));
        assert!(!out.using_held_scores);
        assert!(out.scores.all_zero());
    }

    #[test]
    fn test_warning_raised_once_per_episode() {
        let mut stabilizer = ScoreStabilizer::default();
        let raised: Vec<bool> = (0..5)
            .map(|i| stabilizer.process(zero(), t(i * 100)).warning_raised)
            .collect();
        assert_eq!(raised, vec![false, false, false, true, false]);
        assert!(stabilizer.is_degraded());

        // A valid frame ends the episode; the next run can warn again
        stabilizer.process(valid(), t(600));
        assert!(!stabilizer.is_degraded());
        assert_eq!(stabilizer.zero_run(), 0);
        let raised: Vec<bool> = (0..4)
            .map(|i| stabilizer.process(zero(), t(700 + i * 100)).warning_raised)
            .collect();
        assert_eq!(raised, vec![false, false, false, true]);
    }

    #[test]
    fn test_status_marks_zero_equivalent() {
        let mut v = valid();
        v.status = Some("analysis_error".to_string());
        assert!(is_zero_equivalent(&v));
        v.status = Some("ok".to_string());
        assert!(!is_zero_equivalent(&v));
    }

    #[test]
    fn test_valid_frame_replaces_held() {
        let mut stabilizer = ScoreStabilizer::default();
        stabilizer.process(valid(), t(0));
        let mut newer = valid();
        newer.posture = 40;
        stabilizer.process(newer.clone(), t(1_000));
        let out = stabilizer.process(zero(), t(3_900));
        assert!(out.using_held_scores);
        assert_eq!(out.scores, newer);
    }
}
