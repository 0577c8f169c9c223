//! Eye aspect ratio and blink tracking

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::indices::{LEFT_EYE, RIGHT_EYE};
use crate::calibration::Calibration;
use crate::types::{BlinkState, EyeMetrics, LandmarkFrame};

/// Shortest closure counted as a blink (ms)
pub const MIN_BLINK_MS: i64 = 50;
/// Longest closure counted as a blink (ms)
pub const MAX_BLINK_MS: i64 = 500;
/// Window for the per-minute blink rate (ms)
pub const BLINK_RATE_WINDOW_MS: i64 = 60_000;

/// EAR for one eye, `(|p1-p5| + |p2-p4|) / (2 |p0-p3|)`.
///
/// A degenerate eye (zero corner distance) reads as fully closed.
pub fn eye_aspect_ratio(frame: &LandmarkFrame, idx: &[usize; 6]) -> f64 {
    let p: Vec<_> = idx.iter().map(|&i| frame.point(i)).collect();
    let a = p[1].distance(&p[5]);
    let b = p[2].distance(&p[4]);
    let c = p[0].distance(&p[3]);
    if c <= f64::EPSILON {
        return 0.0;
    }
    (a + b) / (2.0 * c)
}

/// Classify an EAR; a value exactly on a threshold takes the more-closed state
pub fn classify(ear: f64, calibration: &Calibration) -> BlinkState {
    let (closed, blink) = calibration.ear_thresholds();
    if ear <= closed {
        BlinkState::Closed
    } else if ear <= blink {
        BlinkState::Blinking
    } else {
        BlinkState::Open
    }
}

pub fn measure(frame: &LandmarkFrame, calibration: &Calibration) -> EyeMetrics {
    let left_ear = eye_aspect_ratio(frame, &LEFT_EYE);
    let right_ear = eye_aspect_ratio(frame, &RIGHT_EYE);
    let ear = (left_ear + right_ear) / 2.0;
    EyeMetrics {
        left_ear,
        right_ear,
        ear,
        state: classify(ear, calibration),
    }
}

/// Blink statistics over the recent window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlinkStats {
    pub blinks_per_minute: u32,
    pub mean_duration_ms: Option<f64>,
    pub total_blinks: u64,
}

/// Turns per-frame blink states into blink episodes.
///
/// An episode opens when the eye leaves `Open` and closes on the next `Open`
/// frame; it counts when it lasted between `MIN_BLINK_MS` and `MAX_BLINK_MS`.
#[derive(Debug, Clone, Default)]
pub struct BlinkTracker {
    closing_since: Option<DateTime<Utc>>,
    history: VecDeque<(DateTime<Utc>, i64)>,
    total_blinks: u64,
}

impl BlinkTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one frame's state; returns true when it completed a valid blink
    pub fn observe(&mut self, state: BlinkState, at: DateTime<Utc>) -> bool {
        let mut completed = false;
        match (state, self.closing_since) {
            (BlinkState::Open, Some(start)) => {
                let duration = (at - start).num_milliseconds();
                if (MIN_BLINK_MS..=MAX_BLINK_MS).contains(&duration) {
                    self.history.push_back((at, duration));
                    self.total_blinks += 1;
                    completed = true;
                }
                self.closing_since = None;
            }
            (BlinkState::Blinking | BlinkState::Closed, None) => {
                self.closing_since = Some(at);
            }
            _ => {}
        }
        self.prune(at);
        completed
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::milliseconds(BLINK_RATE_WINDOW_MS);
        while matches!(self.history.front(), Some((t, _)) if *t < cutoff) {
            self.history.pop_front();
        }
    }

    pub fn stats(&self) -> BlinkStats {
        let mean_duration_ms = if self.history.is_empty() {
            None
        } else {
            let sum: i64 = self.history.iter().map(|(_, d)| d).sum();
            Some(sum as f64 / self.history.len() as f64)
        };
        BlinkStats {
            blinks_per_minute: self.history.len() as u32,
            mean_duration_ms,
            total_blinks: self.total_blinks,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
